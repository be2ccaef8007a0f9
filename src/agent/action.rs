//! Controllable degrees of freedom and their command encoding.

use serde::{Deserialize, Serialize};

/// One controllable degree of freedom and the rule that turns a raw network
/// sample into a command string for the world interface.
///
/// The order in which specs are handed to a network is fixed for that
/// network's lifetime: it determines how the output head is sliced into
/// per-spec parameter blocks (two scalars per continuous spec, one per
/// binary spec, one per categorical outcome).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionSpec {
    /// A scalar in `[min, max]`, sampled in normalized `[0, 1]` and rescaled.
    Continuous { name: String, min: f32, max: f32 },
    /// A 0/1 outcome.
    Binary { name: String },
    /// One of N mutually exclusive named commands.
    Categorical { names: Vec<String> },
}

impl ActionSpec {
    pub fn continuous(name: &str, min: f32, max: f32) -> Self {
        Self::Continuous {
            name: name.to_string(),
            min,
            max,
        }
    }

    pub fn binary(name: &str) -> Self {
        Self::Binary {
            name: name.to_string(),
        }
    }

    pub fn categorical<S: AsRef<str>>(names: &[S]) -> Self {
        Self::Categorical {
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
        }
    }

    /// Width of this spec's slice of the network output head.
    pub fn param_width(&self) -> usize {
        match self {
            Self::Continuous { .. } => 2,
            Self::Binary { .. } => 1,
            Self::Categorical { names } => names.len(),
        }
    }

    /// Affine map from a normalized `[0, 1]` sample to the action range.
    /// Identity for binary and categorical specs.
    pub fn scale(&self, x: f32) -> f32 {
        match self {
            Self::Continuous { min, max, .. } => x * (max - min) + min,
            _ => x,
        }
    }

    /// Inverse of [`scale`](Self::scale).
    pub fn inv_scale(&self, x: f32) -> f32 {
        match self {
            Self::Continuous { min, max, .. } => (x - min) / (max - min),
            _ => x,
        }
    }

    /// Encode a sampled raw value as a dispatchable command string.
    ///
    /// Continuous values are rescaled to the action range first; categorical
    /// values select a name which is the full command, not a prefix.
    pub fn to_command(&self, value: f32) -> String {
        match self {
            Self::Continuous { name, .. } => format!("{} {}", name, self.scale(value)),
            Self::Binary { name } => format!("{} {}", name, value as i64),
            Self::Categorical { names } => names[value as usize].clone(),
        }
    }
}

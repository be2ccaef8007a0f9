//! Bounded experience buffer with restart-safe persistence.

use std::io::Write;
use std::path::Path;

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{AgentError, Result};

use super::observation::{AgentObs, ObsSpec};

/// The action part of a stored transition: a single outcome index when the
/// acting network is a Q-value view, or the ordered per-spec samples of a
/// stochastic sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionRecord {
    Discrete(u32),
    PerSpec(Vec<f32>),
}

/// One observed step. `next_state == None` marks a terminal transition
/// (death, success, or externally detected episode end).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: AgentObs,
    pub action: ActionRecord,
    pub next_state: Option<AgentObs>,
    pub reward: f32,
}

impl Transition {
    /// Whether every observation in this record matches the shape contract.
    /// Used to drop malformed records on checkpoint reload.
    pub fn conforms_to(&self, spec: &ObsSpec) -> bool {
        self.state.conforms_to(spec)
            && self
                .next_state
                .as_ref()
                .is_none_or(|next| next.conforms_to(spec))
    }
}

/// Fixed-capacity ring of transitions with uniform batch sampling.
///
/// Once full, each push overwrites the slot at the write cursor, which
/// always advances modulo capacity. Relative recency among live transitions
/// is not preserved after wraparound.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplayMemory {
    capacity: usize,
    buffer: Vec<Transition>,
    cursor: usize,
}

impl ReplayMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: Vec::with_capacity(capacity),
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }

    pub fn push(&mut self, transition: Transition) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(transition);
        } else {
            self.buffer[self.cursor] = transition;
        }
        self.cursor = (self.cursor + 1) % self.capacity;
    }

    /// Draw `k` distinct transitions uniformly at random.
    ///
    /// Asking for more than are stored is a caller bug and fails loudly
    /// rather than silently returning fewer.
    pub fn sample<R: Rng>(&self, k: usize, rng: &mut R) -> Result<Vec<&Transition>> {
        if k > self.buffer.len() {
            return Err(AgentError::Precondition(format!(
                "requested {k} transitions but only {} are stored",
                self.buffer.len()
            )));
        }
        Ok(self.buffer.choose_multiple(rng, k).collect())
    }

    /// Serialize the whole buffer to `path`.
    ///
    /// The bytes are staged in a temporary file next to the destination and
    /// moved into place by rename, so an interrupted write never replaces an
    /// existing checkpoint with a partial one; the staging file is removed
    /// on every other exit path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(self, bincode::config::standard())?;

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut staging = NamedTempFile::new_in(dir)?;
        staging.write_all(&bytes)?;
        staging.persist(path).map_err(|e| AgentError::Io(e.error))?;

        tracing::debug!(?path, transitions = self.buffer.len(), "saved replay memory");
        Ok(())
    }

    /// Reload a checkpoint written by [`save`](Self::save).
    ///
    /// Malformed or empty stored transitions are dropped, capacity is reset
    /// to `capacity` (truncating if the stored buffer was larger), and the
    /// write cursor is re-seated uniformly at random within the surviving
    /// length. Reload therefore does not resume the exact write order of the
    /// previous run.
    pub fn load<R: Rng>(
        path: &Path,
        capacity: usize,
        obs_spec: &ObsSpec,
        rng: &mut R,
    ) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let (mut memory, _): (Self, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;

        let stored = memory.buffer.len();
        memory.buffer.retain(|t| t.conforms_to(obs_spec));
        let dropped = stored - memory.buffer.len();
        if dropped > 0 {
            tracing::warn!(dropped, "dropped malformed transitions from replay checkpoint");
        }

        memory.capacity = capacity;
        if memory.buffer.len() > capacity {
            memory.buffer.truncate(capacity);
        }
        memory.cursor = if memory.buffer.is_empty() {
            0
        } else {
            rng.random_range(0..memory.buffer.len())
        };

        tracing::debug!(?path, transitions = memory.buffer.len(), "loaded replay memory");
        Ok(memory)
    }
}

//! Distribution objects recorded during action sampling.
//!
//! Log-probabilities are expressed as tensor ops over the parameter tensors
//! that came out of the network head, so a likelihood-ratio loss built from
//! them stays differentiable. Drawing the actual random sample does not need
//! gradients and goes through `rand`/`rand_distr` on extracted scalars.

use burn::prelude::*;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand_distr::Beta as BetaSampler;

use crate::error::{AgentError, Result};

/// A per-action sampling distribution, kept alive between a forward pass and
/// the loss computation that scores it.
#[derive(Debug, Clone)]
pub enum ActionDistribution<B: Backend> {
    /// Beta(α, β) over the normalized `(0, 1)` range of a continuous action.
    Beta {
        alpha: Tensor<B, 1>,
        beta: Tensor<B, 1>,
    },
    /// Two-outcome categorical `(p, 1-p)`; outcome 0 is drawn with
    /// probability `p`.
    TwoPoint { probs: Tensor<B, 1> },
    /// N-way categorical over an already-softmaxed probability vector.
    Categorical { probs: Tensor<B, 1> },
}

impl<B: Backend> ActionDistribution<B> {
    /// Draw one raw sample: a value in `(0, 1)` for Beta, an outcome index
    /// (as `f32`) otherwise.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Result<f32> {
        match self {
            Self::Beta { alpha, beta } => {
                let a = scalar(alpha);
                let b = scalar(beta);
                let dist = BetaSampler::new(a, b)
                    .map_err(|e| AgentError::InvalidDistribution(format!("beta({a}, {b}): {e}")))?;
                Ok(dist.sample(rng))
            }
            Self::TwoPoint { probs } | Self::Categorical { probs } => {
                let weights = probs.clone().into_data().to_vec::<f32>().unwrap();
                let dist = WeightedIndex::new(&weights)
                    .map_err(|e| AgentError::InvalidDistribution(e.to_string()))?;
                Ok(dist.sample(rng) as f32)
            }
        }
    }

    /// Log-probability of a previously sampled value, as a differentiable
    /// `[1]` tensor. Outcome indices are recovered by truncation, so the
    /// epsilon shift applied by the loss leaves them unchanged.
    pub fn log_prob(&self, value: f32) -> Tensor<B, 1> {
        match self {
            Self::Beta { alpha, beta } => {
                let a = alpha.clone();
                let b = beta.clone();
                (a.clone() - 1.0) * value.ln() + (b.clone() - 1.0) * (1.0 - value).ln()
                    - ln_gamma(a.clone())
                    - ln_gamma(b.clone())
                    + ln_gamma(a + b)
            }
            Self::TwoPoint { probs } | Self::Categorical { probs } => {
                let n = probs.dims()[0];
                let index = (value as usize).min(n - 1);
                probs.clone().slice([index..index + 1]).log()
            }
        }
    }
}

fn scalar<B: Backend>(t: &Tensor<B, 1>) -> f32 {
    t.clone().into_data().to_vec::<f32>().unwrap()[0]
}

/// `ln Γ(z)` for positive `z`, as tensor ops.
///
/// The recurrence `ln Γ(z) = ln Γ(z+6) − Σ ln(z+k)` pushes the argument past
/// 6, where a short Stirling series is accurate to well below the tolerance
/// of the f32 parameters it is applied to.
pub(crate) fn ln_gamma<B: Backend>(z: Tensor<B, 1>) -> Tensor<B, 1> {
    let mut shift = z.clone().log();
    for k in 1..6 {
        shift = shift + (z.clone() + k as f32).log();
    }
    let w = z + 6.0;
    let series = (w.clone() - 0.5) * w.clone().log() - w.clone()
        + 0.5 * (2.0 * core::f32::consts::PI).ln()
        + w.clone().recip() / 12.0
        - w.powf_scalar(3.0).recip() / 360.0;
    series - shift
}

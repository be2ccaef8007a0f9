//! Online off-policy learning core.
//!
//! One network body serves two exposed behaviors:
//! - [`PolicySampler`] draws stochastic actions from network-parameterized
//!   distributions and scores them with a likelihood-ratio loss;
//! - [`QNetwork`] reads the same architecture's head as Q-value estimates
//!   and selects actions epsilon-greedily.
//!
//! [`DqnTrainer`] wires a policy/target pair of Q-networks to a bounded
//! [`ReplayMemory`] and runs the temporal-difference loop:
//!
//! ```text
//! observation + reward
//!     │
//!     ▼
//! DqnTrainer::step ──── stores (prev_state, prev_action, state, reward)
//!     │                 into ReplayMemory (checkpointed to disk)
//!     ▼
//! QNetwork::sample ──── epsilon-greedy over Q-values
//!     │
//!     ▼
//! command strings, dispatched to the world
//! ```

pub mod action;
pub mod distributions;
pub mod metrics;
pub mod network;
pub mod observation;
pub mod policy;
pub mod qnet;
pub mod replay;
pub mod trainer;

use burn::prelude::*;
use rand::Rng;

use crate::error::Result;

pub use action::ActionSpec;
pub use distributions::ActionDistribution;
pub use metrics::{MovingAverage, TrainingMetrics};
pub use network::{ActionNet, ActionNetConfig};
pub use observation::{AgentObs, ObsSpec};
pub use policy::PolicySampler;
pub use qnet::QNetwork;
pub use replay::{ActionRecord, ReplayMemory, Transition};
pub use trainer::{DqnTrainer, DqnTrainerConfig};

/// A network that draws stochastic actions and returns them as dispatchable
/// command strings, one per declared action spec.
pub trait Sampleable {
    fn sample_commands<R: Rng>(&mut self, obs: &AgentObs, rng: &mut R) -> Result<Vec<String>>;
}

/// A network that estimates one Q-value per categorical outcome for each
/// observation in a batch.
pub trait ValueEstimator<B: Backend> {
    fn q_values(&self, batch: &[&AgentObs]) -> Result<Tensor<B, 2>>;
}

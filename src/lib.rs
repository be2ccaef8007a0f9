//! craftbot — an online, off-policy learning agent for a simulated voxel
//! world. It selects an action each control step, learns from the
//! consequences of past actions through a replayed temporal-difference loss,
//! and persists its experience across restarts. The world itself is an
//! external collaborator behind [`env::Environment`].

pub mod agent;
pub mod driver;
pub mod env;
pub mod error;

// Re-export commonly used types for convenience
pub use agent::{ActionSpec, AgentObs, DqnTrainer, DqnTrainerConfig, ObsSpec};
pub use driver::{EpisodeConfig, EpisodeRunner, EpsilonSchedule};
pub use env::{EnvStep, Environment};
pub use error::{AgentError, Result};

//! Boundary to the simulated world.
//!
//! The world itself — generation, missions, sensing, command transport — is
//! an external collaborator. This crate only consumes it: one observation
//! bundle plus the reward earned since the last dispatch in, an ordered
//! sequence of command strings out.

use crate::agent::AgentObs;

/// One round of environment feedback.
#[derive(Debug, Clone)]
pub struct EnvStep {
    /// The new observation, absent when the world could not produce one
    /// (e.g. the episode ended with the agent gone).
    pub observation: Option<AgentObs>,
    /// Reward earned since the previous dispatch.
    pub reward: f32,
    /// Whether the episode is over (death, success, or mission end).
    pub terminal: bool,
}

/// The external world as seen by the training loop.
pub trait Environment {
    /// Block until the world produces the next feedback round.
    fn observe(&mut self) -> EnvStep;

    /// Send the selected commands to the world. Each string is independently
    /// dispatchable.
    fn dispatch(&mut self, commands: &[String]);
}

//! Error taxonomy for the learning core.
//!
//! Three kinds of failure are distinguished: violated preconditions (caller
//! bugs), numerical defects (upstream blow-ups that must not be swallowed),
//! and I/O or serialization failures around checkpoints. Expected-empty
//! conditions (not enough transitions for a loss, no pending transition to
//! finalize) are not errors and never appear here.

use burn::record::RecorderError;

pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// A caller-side contract violation, e.g. sampling more transitions
    /// than the replay memory holds.
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// The accumulated loss is NaN or infinite. Indicates a reward-scale or
    /// network-output blow-up upstream.
    #[error("non-finite loss")]
    NonFiniteLoss,

    /// Distribution parameters that cannot be sampled from (zero weights,
    /// NaN shape parameters).
    #[error("invalid distribution parameters: {0}")]
    InvalidDistribution(String),

    /// A stored transition carries an action record incompatible with the
    /// network mode that is trying to learn from it.
    #[error("stored action record does not match the learner's action mode")]
    MalformedAction,

    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint encoding failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("checkpoint decoding failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("model recorder failed: {0}")]
    Record(#[from] RecorderError),
}

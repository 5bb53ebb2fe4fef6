//! Job state machine for the campaign queue.

use serde::{Deserialize, Serialize};

/// Job state.
///
/// State transitions:
/// - Waiting -> Active -> Completed
/// - Waiting -> Active -> Delayed -> Waiting (loop until max_attempts)
/// - Waiting -> Active -> Failed (when max_attempts reached)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Ready to be leased.
    Waiting,

    /// Leased by a worker.
    Active,

    /// Failed, waiting for its backoff delay to pass.
    Delayed,

    /// Delivered.
    Completed,

    /// Attempts exhausted.
    Failed,
}

impl JobState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Is this job eligible for lease?
    pub fn is_runnable(self) -> bool {
        matches!(self, JobState::Waiting)
    }
}

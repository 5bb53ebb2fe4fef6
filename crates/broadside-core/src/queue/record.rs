//! Job record: metadata + delivery job.

use tokio::time::Instant;

use super::JobState;
use crate::domain::DeliveryJob;

/// Metadata + job for an entry in the queue.
///
/// Design:
/// - This is the "single source of truth" for job state.
/// - Queue structures (ready/scheduled) hold JobId only.
/// - All state transitions happen here.
///
/// `tokio::time::Instant` is used so paused-clock tests drive the backoff.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job: DeliveryJob,
    pub state: JobState,

    /// Number of attempts started (including the current one while Active).
    pub attempts: u32,

    pub max_attempts: u32,

    pub last_error: Option<String>,

    /// When the job becomes Waiting again (Delayed only).
    pub next_run_at: Option<Instant>,

    pub created_at: Instant,
    pub updated_at: Instant,
}

impl JobRecord {
    pub fn new(job: DeliveryJob, max_attempts: u32) -> Self {
        let now = Instant::now();
        Self {
            job,
            state: JobState::Waiting,
            attempts: 0,
            max_attempts,
            last_error: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark as active (increment attempts).
    pub fn start_attempt(&mut self) {
        self.state = JobState::Active;
        self.attempts += 1;
        self.updated_at = Instant::now();
    }

    pub fn mark_completed(&mut self) {
        self.state = JobState::Completed;
        self.updated_at = Instant::now();
    }

    /// Mark as failed (max attempts reached).
    pub fn mark_failed(&mut self, error: String) {
        self.state = JobState::Failed;
        self.last_error = Some(error);
        self.updated_at = Instant::now();
    }

    /// Schedule retry with backoff.
    pub fn schedule_retry(&mut self, next_run_at: Instant, error: String) {
        self.state = JobState::Delayed;
        self.next_run_at = Some(next_run_at);
        self.last_error = Some(error);
        self.updated_at = Instant::now();
    }

    /// Move from Delayed back to Waiting.
    pub fn requeue(&mut self) {
        self.state = JobState::Waiting;
        self.next_run_at = None;
        self.updated_at = Instant::now();
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

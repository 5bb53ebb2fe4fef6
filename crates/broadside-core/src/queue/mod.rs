//! Queue module: per-campaign job queue, retry logic, and in-memory implementation.

mod memory;
mod record;
mod retry;
mod state;

pub use memory::{InMemoryQueue, InMemoryQueueFactory};
pub use record::JobRecord;
pub use retry::RetryPolicy;
pub use state::JobState;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{CampaignId, DeliveryJob, JobId};
use crate::observability::QueueCounts;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue for {0} is closed")]
    Closed(CampaignId),

    #[error("job {0} is already queued")]
    DuplicateJob(JobId),

    #[error("queue backend: {0}")]
    Backend(String),
}

/// What the queue decided after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// The job goes back to Waiting after `delay`.
    Retry { attempt: u32, delay: Duration },

    /// The job will not be attempted again.
    Exhausted { attempts: u32 },

    /// The queue was torn down while the attempt was in flight.
    Discarded,
}

/// A leased job for processing.
/// The worker owns this lease and must either `complete` or `fail`.
///
/// Design intent:
/// - Queue manages state transitions (Waiting -> Active -> ...).
/// - Worker executes side effects (ledger, gateway) and reports the result.
#[async_trait]
pub trait JobLease: Send {
    fn job(&self) -> &DeliveryJob;

    /// 1-based attempt number of this lease.
    fn attempt(&self) -> u32;

    /// Mark success.
    async fn complete(self: Box<Self>) -> Result<(), QueueError>;

    /// Mark failure (queue decides retry/exhaustion).
    async fn fail(self: Box<Self>, error: String) -> Result<FailureDisposition, QueueError>;
}

/// Queue port (interface): the durable-queue substrate of one campaign.
/// The in-memory implementation is the default; this trait is the seam for
/// swapping in an external store later.
#[async_trait]
pub trait JobQueue: Send + Sync {
    fn campaign_id(&self) -> CampaignId;

    async fn enqueue(&self, job: DeliveryJob) -> Result<JobId, QueueError>;

    /// Lease one ready job. Waits until one is available; `None` once closed.
    async fn lease(&self) -> Option<Box<dyn JobLease>>;

    async fn counts(&self) -> Result<QueueCounts, QueueError>;

    /// Stop handing out jobs and discard waiting/delayed ones.
    /// Returns the number of discarded jobs.
    async fn close(&self) -> Result<usize, QueueError>;
}

/// Creates one queue per campaign.
pub trait QueueFactory: Send + Sync {
    fn create(&self, campaign_id: CampaignId) -> Arc<dyn JobQueue>;
}

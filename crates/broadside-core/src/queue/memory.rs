//! In-memory queue implementation.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{
    FailureDisposition, JobLease, JobQueue, JobRecord, JobState, QueueError, QueueFactory,
    RetryPolicy,
};
use crate::domain::{CampaignId, DeliveryJob, JobId};
use crate::observability::QueueCounts;

/// Delayed job entry for the priority queue.
///
/// We use reverse ordering so BinaryHeap acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledJob {
    next_run_at: Instant,
    job_id: JobId,
}

impl PartialOrd for ScheduledJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .next_run_at
            .cmp(&self.next_run_at)
            .then_with(|| other.job_id.cmp(&self.job_id))
    }
}

struct QueueState {
    /// All job records (single source of truth).
    records: HashMap<JobId, JobRecord>,

    /// Ready queue (JobIds only), in enqueue order.
    ready: VecDeque<JobId>,

    /// Delayed queue (retry backoff).
    scheduled: BinaryHeap<ScheduledJob>,

    closed: bool,

    retry_policy: RetryPolicy,
}

impl QueueState {
    fn new(retry_policy: RetryPolicy) -> Self {
        Self {
            records: HashMap::new(),
            ready: VecDeque::new(),
            scheduled: BinaryHeap::new(),
            closed: false,
            retry_policy,
        }
    }

    /// Move jobs from scheduled to ready if their time has come.
    fn promote_scheduled_jobs(&mut self) {
        let now = Instant::now();
        while let Some(entry) = self.scheduled.peek() {
            if entry.next_run_at > now {
                break; // Heap is sorted, so we can stop
            }
            let Some(entry) = self.scheduled.pop() else {
                break;
            };
            if let Some(record) = self.records.get_mut(&entry.job_id)
                && record.state == JobState::Delayed
            {
                record.requeue();
                self.ready.push_back(entry.job_id);
            }
        }
    }

    fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for record in self.records.values() {
            match record.state {
                JobState::Waiting => counts.waiting += 1,
                JobState::Active => counts.active += 1,
                JobState::Delayed => counts.delayed += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    fn close(&mut self) -> usize {
        self.closed = true;
        self.ready.clear();
        self.scheduled.clear();
        let before = self.records.len();
        self.records
            .retain(|_, record| !matches!(record.state, JobState::Waiting | JobState::Delayed));
        before - self.records.len()
    }
}

/// In-memory queue for one campaign.
///
/// Jobs are handed out in enqueue order; retried jobs rejoin the back of the
/// ready queue once their delay passes.
pub struct InMemoryQueue {
    campaign_id: CampaignId,
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

impl InMemoryQueue {
    pub fn new(campaign_id: CampaignId, retry_policy: RetryPolicy) -> Self {
        Self {
            campaign_id,
            state: Arc::new(Mutex::new(QueueState::new(retry_policy))),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Snapshot of one job's record.
    pub async fn record(&self, job_id: JobId) -> Option<JobRecord> {
        let state = self.state.lock().await;
        state.records.get(&job_id).cloned()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    fn campaign_id(&self) -> CampaignId {
        self.campaign_id
    }

    async fn enqueue(&self, job: DeliveryJob) -> Result<JobId, QueueError> {
        let job_id = job.job_id;
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(QueueError::Closed(self.campaign_id));
            }
            if state.records.contains_key(&job_id) {
                return Err(QueueError::DuplicateJob(job_id));
            }
            let record = JobRecord::new(job, state.retry_policy.max_attempts);
            state.records.insert(job_id, record);
            state.ready.push_back(job_id);
        }

        // Notify waiting workers
        self.notify.notify_one();
        Ok(job_id)
    }

    async fn lease(&self) -> Option<Box<dyn JobLease>> {
        loop {
            let next_wake = {
                let mut guard = self.state.lock().await;
                let state = &mut *guard;
                if state.closed {
                    return None;
                }
                state.promote_scheduled_jobs();

                while let Some(job_id) = state.ready.pop_front() {
                    let Some(record) = state.records.get_mut(&job_id) else {
                        continue;
                    };
                    if !record.state.is_runnable() {
                        continue;
                    }
                    record.start_attempt();
                    let lease = InMemoryLease {
                        job_id,
                        job: record.job.clone(),
                        attempt: record.attempts,
                        state: Arc::clone(&self.state),
                        notify: Arc::clone(&self.notify),
                    };
                    return Some(Box::new(lease));
                }

                // No ready jobs - check if we have delayed ones
                state.scheduled.peek().map(|entry| entry.next_run_at)
            };

            // Wait for notification OR next delayed job time
            if let Some(wake_time) = next_wake {
                tokio::select! {
                    _ = self.notify.notified() => {},
                    _ = tokio::time::sleep_until(wake_time) => {},
                }
            } else {
                self.notify.notified().await;
            }
        }
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let state = self.state.lock().await;
        Ok(state.counts())
    }

    async fn close(&self) -> Result<usize, QueueError> {
        let discarded = {
            let mut state = self.state.lock().await;
            state.close()
        };
        self.notify.notify_waiters();
        Ok(discarded)
    }
}

/// Lease implementation for InMemoryQueue.
struct InMemoryLease {
    job_id: JobId,
    job: DeliveryJob,
    attempt: u32,
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

#[async_trait]
impl JobLease for InMemoryLease {
    fn job(&self) -> &DeliveryJob {
        &self.job
    }

    fn attempt(&self) -> u32 {
        self.attempt
    }

    async fn complete(self: Box<Self>) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some(record) = state.records.get_mut(&self.job_id) {
            record.mark_completed();
        }
        Ok(())
    }

    async fn fail(self: Box<Self>, error: String) -> Result<FailureDisposition, QueueError> {
        let disposition = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            let Some(record) = state.records.get_mut(&self.job_id) else {
                return Ok(FailureDisposition::Discarded);
            };

            if state.closed {
                // close() 後の失敗はリトライしない
                record.mark_failed(error);
                FailureDisposition::Discarded
            } else if record.attempts_exhausted() {
                let attempts = record.attempts;
                record.mark_failed(error);
                FailureDisposition::Exhausted { attempts }
            } else {
                // Schedule retry with backoff
                let delay = state.retry_policy.next_delay(record.attempts);
                let next_run_at = Instant::now() + delay;
                let attempt = record.attempts;
                record.schedule_retry(next_run_at, error);
                state.scheduled.push(ScheduledJob {
                    next_run_at,
                    job_id: self.job_id,
                });
                FailureDisposition::Retry { attempt, delay }
            }
        }; // Lock released here

        // Notify outside the lock so a parked worker re-computes its wake time
        if matches!(disposition, FailureDisposition::Retry { .. }) {
            self.notify.notify_one();
        }

        Ok(disposition)
    }
}

/// Builds an [`InMemoryQueue`] per campaign with a shared retry policy.
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueueFactory {
    retry_policy: RetryPolicy,
}

impl InMemoryQueueFactory {
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self { retry_policy }
    }
}

impl QueueFactory for InMemoryQueueFactory {
    fn create(&self, campaign_id: CampaignId) -> Arc<dyn JobQueue> {
        Arc::new(InMemoryQueue::new(campaign_id, self.retry_policy.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::{OwnerId, ServerCredential, ServerId, TransportSecurity};

    fn job(campaign_id: CampaignId, recipient: &str) -> DeliveryJob {
        DeliveryJob {
            job_id: JobId::generate(),
            campaign_id,
            position: 0,
            recipient: recipient.to_string(),
            server: ServerCredential {
                id: ServerId::generate(),
                name: "S1".to_string(),
                host: "localhost".to_string(),
                port: 2525,
                username: "news@example.com".to_string(),
                secret: "pw".to_string(),
                security: TransportSecurity::Tls,
                owner: OwnerId::generate(),
                active: true,
            },
            subject: "hi".to_string(),
            body: "<p>hi</p>".to_string(),
        }
    }

    fn queue() -> (CampaignId, InMemoryQueue) {
        let campaign_id = CampaignId::generate();
        (campaign_id, InMemoryQueue::new(campaign_id, RetryPolicy::default()))
    }

    #[tokio::test]
    async fn enqueue_and_counts() {
        let (cid, queue) = queue();

        queue.enqueue(job(cid, "a@x.com")).await.unwrap();

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.waiting, 1);
        assert_eq!(counts.active, 0);
        assert!(!counts.is_drained());
    }

    #[tokio::test]
    async fn duplicate_job_is_rejected() {
        let (cid, queue) = queue();
        let j = job(cid, "a@x.com");

        queue.enqueue(j.clone()).await.unwrap();
        let err = queue.enqueue(j).await.unwrap_err();
        assert!(matches!(err, QueueError::DuplicateJob(_)));
    }

    #[tokio::test]
    async fn lease_follows_enqueue_order() {
        let (cid, queue) = queue();
        queue.enqueue(job(cid, "a@x.com")).await.unwrap();
        queue.enqueue(job(cid, "b@x.com")).await.unwrap();

        let first = queue.lease().await.unwrap();
        let second = queue.lease().await.unwrap();

        assert_eq!(first.job().recipient, "a@x.com");
        assert_eq!(second.job().recipient, "b@x.com");
        assert_eq!(first.attempt(), 1);

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.waiting, 0);
        assert_eq!(counts.active, 2);
    }

    #[tokio::test]
    async fn complete_marks_completed_and_drains() {
        let (cid, queue) = queue();
        queue.enqueue(job(cid, "a@x.com")).await.unwrap();

        let lease = queue.lease().await.unwrap();
        lease.complete().await.unwrap();

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.completed, 1);
        assert!(counts.is_drained());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_retried_after_backoff() {
        let (cid, queue) = queue();
        let job_id = queue.enqueue(job(cid, "a@x.com")).await.unwrap();

        let lease = queue.lease().await.unwrap();
        let disposition = lease.fail("connection refused".to_string()).await.unwrap();
        assert_eq!(
            disposition,
            FailureDisposition::Retry {
                attempt: 1,
                delay: Duration::from_secs(2)
            }
        );

        // delayed jobs keep the queue from counting as drained
        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.delayed, 1);
        assert!(!counts.is_drained());

        let started = Instant::now();
        let lease = queue.lease().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(lease.attempt(), 2);

        let record = queue.record(job_id).await.unwrap();
        assert_eq!(record.last_error.as_deref(), Some("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn third_failure_exhausts_the_job() {
        let (cid, queue) = queue();
        queue.enqueue(job(cid, "a@x.com")).await.unwrap();

        let mut dispositions = Vec::new();
        for _ in 0..3 {
            let lease = queue.lease().await.unwrap();
            dispositions.push(lease.fail("boom".to_string()).await.unwrap());
        }

        assert_eq!(
            dispositions,
            vec![
                FailureDisposition::Retry {
                    attempt: 1,
                    delay: Duration::from_secs(2)
                },
                FailureDisposition::Retry {
                    attempt: 2,
                    delay: Duration::from_secs(4)
                },
                FailureDisposition::Exhausted { attempts: 3 },
            ]
        );

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.failed, 1);
        assert!(counts.is_drained());
    }

    #[tokio::test]
    async fn close_discards_waiting_jobs() {
        let (cid, queue) = queue();
        queue.enqueue(job(cid, "a@x.com")).await.unwrap();
        queue.enqueue(job(cid, "b@x.com")).await.unwrap();
        queue.enqueue(job(cid, "c@x.com")).await.unwrap();

        let in_flight = queue.lease().await.unwrap();
        let discarded = queue.close().await.unwrap();
        assert_eq!(discarded, 2);

        assert!(queue.lease().await.is_none());
        assert!(matches!(
            queue.enqueue(job(cid, "d@x.com")).await,
            Err(QueueError::Closed(_))
        ));

        // in-flight work may still report back, but is never retried
        let disposition = in_flight.fail("late".to_string()).await.unwrap();
        assert_eq!(disposition, FailureDisposition::Discarded);
    }

    #[tokio::test]
    async fn close_wakes_parked_lease() {
        let (_cid, queue) = queue();
        let queue = Arc::new(queue);

        let parked = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.lease().await.is_none() }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close().await.unwrap();

        let returned_none = tokio::time::timeout(Duration::from_secs(1), parked)
            .await
            .unwrap()
            .unwrap();
        assert!(returned_none);
    }

    #[tokio::test]
    async fn factory_builds_independent_queues() {
        let factory = InMemoryQueueFactory::new(RetryPolicy::default());
        let a = factory.create(CampaignId::generate());
        let b = factory.create(CampaignId::generate());

        a.enqueue(job(a.campaign_id(), "a@x.com")).await.unwrap();

        assert_eq!(a.counts().await.unwrap().waiting, 1);
        assert_eq!(b.counts().await.unwrap().waiting, 0);
    }
}

//! ActiveQueues - 実行中 campaign の queue 表
//!
//! campaign id → (queue, worker group) の対応を 1 つの Mutex で守る。
//! 「drain 判定 → Completed → teardown」と Start はこのロックで直列化されるので、
//! Start が半分壊れた queue を見ることはない。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::worker::{LedgerGate, WorkerDeps, WorkerGroup};
use crate::domain::{CampaignId, CampaignStatus, DeliveryJob};
use crate::error::EngineError;
use crate::observability::QueueCounts;
use crate::ports::{CampaignStore, DeliveryGateway, DeliveryLedger};
use crate::queue::{JobQueue, QueueFactory};

/// Collaborators shared by every worker.
pub(crate) struct DeliveryContext {
    pub store: Arc<dyn CampaignStore>,
    pub ledger: Arc<dyn DeliveryLedger>,
    pub gateway: Arc<dyn DeliveryGateway>,
}

struct QueueHandle {
    /// Distinguishes a restarted campaign from the queue a stale worker belonged to.
    generation: u64,
    queue: Arc<dyn JobQueue>,
    workers: WorkerGroup,
    gate: LedgerGate,
}

impl QueueHandle {
    async fn dismantle(self) -> usize {
        let discarded = match self.queue.close().await {
            Ok(n) => n,
            Err(e) => {
                error!(error = %e, "queue close failed");
                0
            }
        };
        // queue を閉じてから gate: 締め出された job の fail は Discarded になる
        self.gate.close().await;
        // join はしない: 自分自身の worker から呼ばれることがある
        self.workers.request_shutdown();
        discarded
    }
}

pub struct ActiveQueues {
    queues: Mutex<HashMap<CampaignId, QueueHandle>>,
    context: Arc<DeliveryContext>,
    factory: Arc<dyn QueueFactory>,
    concurrency: usize,
    next_generation: AtomicU64,
}

impl ActiveQueues {
    pub(crate) fn new(
        context: DeliveryContext,
        factory: Arc<dyn QueueFactory>,
        concurrency: usize,
    ) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            context: Arc::new(context),
            factory,
            concurrency: concurrency.max(1),
            next_generation: AtomicU64::new(0),
        }
    }

    pub async fn is_live(&self, campaign_id: CampaignId) -> bool {
        self.queues.lock().await.contains_key(&campaign_id)
    }

    pub async fn live_campaigns(&self) -> Vec<CampaignId> {
        self.queues.lock().await.keys().copied().collect()
    }

    /// Set Running, create the queue and its workers, enqueue `jobs`.
    ///
    /// Everything happens under the map lock, so an early finisher cannot
    /// declare the campaign drained before the last job is queued.
    /// On an enqueue failure the partial queue is torn down and the status
    /// goes back to `previous`.
    pub(crate) async fn launch(
        self: &Arc<Self>,
        campaign_id: CampaignId,
        previous: CampaignStatus,
        jobs: Vec<DeliveryJob>,
    ) -> Result<usize, EngineError> {
        let mut queues = self.queues.lock().await;
        if queues.contains_key(&campaign_id) {
            return Err(EngineError::AlreadyRunning(campaign_id));
        }

        self.context
            .store
            .set_status(campaign_id, CampaignStatus::Running)
            .await?;

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let queue = self.factory.create(campaign_id);
        let gate = LedgerGate::open();
        let workers = WorkerGroup::spawn(
            self.concurrency,
            WorkerDeps {
                queue: Arc::clone(&queue),
                context: Arc::clone(&self.context),
                queues: Arc::downgrade(self),
                generation,
                gate: gate.clone(),
            },
        );
        let handle = QueueHandle {
            generation,
            queue: Arc::clone(&queue),
            workers,
            gate,
        };

        let total = jobs.len();
        for job in jobs {
            if let Err(e) = queue.enqueue(job).await {
                error!(campaign_id = %campaign_id, error = %e, "enqueue failed, rolling back start");
                handle.dismantle().await;
                if let Err(revert) = self.context.store.set_status(campaign_id, previous).await {
                    error!(campaign_id = %campaign_id, error = %revert, "failed to revert status");
                }
                return Err(e.into());
            }
        }

        queues.insert(campaign_id, handle);
        info!(
            campaign_id = %campaign_id,
            queued = total,
            workers = self.concurrency,
            "campaign queue started"
        );
        Ok(total)
    }

    /// Remove and dismantle the campaign's queue, if any.
    /// Returns the number of discarded (waiting or delayed) jobs.
    /// Once this returns, workers of the old queue write no new ledger rows.
    pub async fn teardown(&self, campaign_id: CampaignId) -> Option<usize> {
        let handle = self.queues.lock().await.remove(&campaign_id)?;
        let discarded = handle.dismantle().await;
        info!(campaign_id = %campaign_id, discarded, "campaign queue torn down");
        Some(discarded)
    }

    /// Set Terminated and dismantle the queue under the map lock, so a
    /// worker finishing the last job cannot mark the campaign Completed
    /// in between. Returns the number of discarded jobs, `None` when no
    /// queue was live.
    pub(crate) async fn terminate(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Option<usize>, EngineError> {
        let mut queues = self.queues.lock().await;
        self.context
            .store
            .set_status(campaign_id, CampaignStatus::Terminated)
            .await?;

        let Some(handle) = queues.remove(&campaign_id) else {
            return Ok(None);
        };
        let discarded = handle.dismantle().await;
        info!(campaign_id = %campaign_id, discarded, "campaign queue torn down");
        Ok(Some(discarded))
    }

    /// Completion check, called by a worker after a job became terminal.
    pub(crate) async fn settle(&self, campaign_id: CampaignId, generation: u64) {
        let mut queues = self.queues.lock().await;

        let Some(handle) = queues.get(&campaign_id) else {
            return;
        };
        if handle.generation != generation {
            return; // 古い世代の worker
        }

        let counts = match handle.queue.counts().await {
            Ok(counts) => counts,
            Err(e) => {
                error!(campaign_id = %campaign_id, error = %e, "queue counts failed");
                return;
            }
        };
        if !counts.is_drained() {
            debug!(campaign_id = %campaign_id, ?counts, "queue not drained yet");
            return;
        }

        if let Err(e) = self
            .context
            .store
            .set_status(campaign_id, CampaignStatus::Completed)
            .await
        {
            error!(campaign_id = %campaign_id, error = %e, "failed to mark campaign completed");
        }

        if let Some(handle) = queues.remove(&campaign_id) {
            handle.dismantle().await;
        }
        info!(
            campaign_id = %campaign_id,
            completed = counts.completed,
            failed = counts.failed,
            "campaign completed"
        );
    }

    pub async fn counts(&self, campaign_id: CampaignId) -> Option<QueueCounts> {
        let queue = {
            let queues = self.queues.lock().await;
            Arc::clone(&queues.get(&campaign_id)?.queue)
        };
        match queue.counts().await {
            Ok(counts) => Some(counts),
            Err(e) => {
                error!(campaign_id = %campaign_id, error = %e, "queue counts failed");
                None
            }
        }
    }

    /// Close every live queue and wait for all workers to exit.
    pub async fn shutdown_all(&self) {
        let handles: Vec<(CampaignId, QueueHandle)> =
            self.queues.lock().await.drain().collect();
        for (campaign_id, handle) in handles {
            if let Err(e) = handle.queue.close().await {
                error!(campaign_id = %campaign_id, error = %e, "queue close failed");
            }
            handle.workers.shutdown_and_join().await;
        }
    }
}

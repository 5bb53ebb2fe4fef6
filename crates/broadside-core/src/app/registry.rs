//! CampaignRegistry - campaign ライフサイクルの司令塔
//!
//! status の書き換えと queue の生成・破棄をここで束ねる。
//! 実際の配送は queue の worker が行う。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::active_queues::ActiveQueues;
use crate::domain::{CampaignId, CampaignStatus, DeliveryJob, DeliveryRecord};
use crate::error::EngineError;
use crate::observability::CampaignSnapshot;
use crate::ports::{CampaignStore, Clock, DeliveryLedger, IdGenerator};

/// Result of a successful Start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReport {
    pub campaign_id: CampaignId,
    /// One job per recipient.
    pub queued: usize,
}

/// Outcome of one `start_due` pass.
#[derive(Debug, Default)]
pub struct DueStarts {
    pub started: Vec<StartReport>,
    /// These campaigns stay Scheduled.
    pub failed: Vec<(CampaignId, EngineError)>,
}

/// Cheap to clone; all clones share one queue map.
#[derive(Clone)]
pub struct CampaignRegistry {
    inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
    pub store: Arc<dyn CampaignStore>,
    pub ledger: Arc<dyn DeliveryLedger>,
    pub ids: Arc<dyn IdGenerator>,
    pub clock: Arc<dyn Clock>,
    pub queues: Arc<ActiveQueues>,
}

impl CampaignRegistry {
    pub(crate) fn from_inner(inner: RegistryInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    pub fn active_queues(&self) -> &Arc<ActiveQueues> {
        &self.inner.queues
    }

    /// Resolve recipients and servers, then launch a dedicated queue.
    ///
    /// # Errors
    /// - `NotFound` / `TemplateNotFound`: resolution failed, nothing changed
    /// - `NoServers` / `NoRecipients`: nothing to send, nothing changed
    /// - `AlreadyRunning`: the campaign already has a live queue
    /// - store or queue errors while launching; the status is reverted
    pub async fn start_campaign(&self, id: CampaignId) -> Result<StartReport, EngineError> {
        let inner = &self.inner;

        let campaign = inner.store.get(id).await?.ok_or(EngineError::NotFound(id))?;
        if inner.queues.is_live(id).await {
            return Err(EngineError::AlreadyRunning(id));
        }

        let definition = inner.store.resolve(id).await?;
        if definition.servers.is_empty() {
            return Err(EngineError::NoServers(id));
        }
        if definition.recipients.is_empty() {
            return Err(EngineError::NoRecipients(id));
        }

        let jobs = DeliveryJob::plan(&definition, || inner.ids.generate_job_id());
        let queued = inner.queues.launch(id, campaign.status, jobs).await?;

        info!(
            campaign_id = %id,
            queued,
            servers = definition.servers.len(),
            "campaign started"
        );
        Ok(StartReport {
            campaign_id: id,
            queued,
        })
    }

    /// Paused only changes the status; the queue keeps delivering.
    pub async fn pause_campaign(&self, id: CampaignId) -> Result<(), EngineError> {
        self.inner.store.set_status(id, CampaignStatus::Paused).await?;
        info!(campaign_id = %id, "campaign paused");
        Ok(())
    }

    /// Back to Running. Nothing is re-enqueued.
    pub async fn resume_campaign(&self, id: CampaignId) -> Result<(), EngineError> {
        self.inner.store.set_status(id, CampaignStatus::Running).await?;
        if !self.inner.queues.is_live(id).await {
            warn!(campaign_id = %id, "resumed campaign has no live queue");
        }
        info!(campaign_id = %id, "campaign resumed");
        Ok(())
    }

    /// Terminated; waiting and delayed jobs are discarded.
    /// In-flight sends finish but no longer affect anything.
    pub async fn terminate_campaign(&self, id: CampaignId) -> Result<(), EngineError> {
        let discarded = self.inner.queues.terminate(id).await?.unwrap_or(0);
        info!(campaign_id = %id, discarded, "campaign terminated");
        Ok(())
    }

    /// Only records the time; the schedule loop does the starting.
    pub async fn schedule_campaign(
        &self,
        id: CampaignId,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.inner.store.set_schedule(id, at).await?;
        info!(campaign_id = %id, scheduled_for = %at, "campaign scheduled");
        Ok(())
    }

    /// Tear down the queue, drop ledger rows, remove the campaign.
    pub async fn delete_campaign(&self, id: CampaignId) -> Result<(), EngineError> {
        let inner = &self.inner;
        if inner.store.get(id).await?.is_none() {
            return Err(EngineError::NotFound(id));
        }

        inner.queues.teardown(id).await;
        let removed = inner.ledger.delete_by_campaign(id).await?;
        if !inner.store.delete(id).await? {
            return Err(EngineError::NotFound(id));
        }
        info!(campaign_id = %id, ledger_rows = removed, "campaign deleted");
        Ok(())
    }

    /// Ledger rows of the campaign in dispatch order.
    pub async fn delivery_log(&self, id: CampaignId) -> Result<Vec<DeliveryRecord>, EngineError> {
        let entries = self.inner.ledger.query_by_campaign(id).await?;
        Ok(entries.into_iter().map(DeliveryRecord::from).collect())
    }

    pub async fn status(&self, id: CampaignId) -> Result<CampaignSnapshot, EngineError> {
        let campaign = self
            .inner
            .store
            .get(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        Ok(CampaignSnapshot {
            campaign_id: id,
            status: campaign.status,
            queue: self.inner.queues.counts(id).await,
        })
    }

    /// Start every Scheduled campaign whose time has come.
    ///
    /// A failed Start does not stop the pass. It leaves the campaign
    /// Scheduled, so the next call tries again.
    pub async fn start_due(&self, now: DateTime<Utc>) -> Result<DueStarts, EngineError> {
        let due = self.inner.store.due_scheduled(now).await?;
        let mut outcome = DueStarts::default();
        for id in due {
            match self.start_campaign(id).await {
                Ok(report) => outcome.started.push(report),
                Err(e) => {
                    warn!(campaign_id = %id, error = %e, "scheduled start failed");
                    outcome.failed.push((id, e));
                }
            }
        }
        Ok(outcome)
    }

    /// Close every live queue and wait for the workers.
    pub async fn shutdown(&self) {
        self.inner.queues.shutdown_all().await;
    }
}

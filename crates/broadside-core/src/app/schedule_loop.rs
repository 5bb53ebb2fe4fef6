//! ScheduleLoop - 予約 campaign の起動
//!
//! # フロー
//! 1. Clock で now を取得
//! 2. CampaignStore::due_scheduled(now) で期限が来たものを取得
//! 3. それぞれ Start（失敗したら次の tick で再挑戦）
//! 4. 失敗は `report_failures_to` で渡された channel にも流す

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::registry::{CampaignRegistry, StartReport};
use crate::domain::CampaignId;
use crate::error::EngineError;
use crate::ports::Clock;

/// A scheduled Start that failed. The campaign is still Scheduled.
#[derive(Debug)]
pub struct ScheduleFailure {
    pub campaign_id: CampaignId,
    pub error: EngineError,
}

pub struct ScheduleLoop {
    registry: CampaignRegistry,
    clock: Arc<dyn Clock>,
    interval: Duration,
    failures: Option<mpsc::UnboundedSender<ScheduleFailure>>,
}

impl ScheduleLoop {
    pub fn new(registry: CampaignRegistry, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            registry,
            clock,
            interval,
            failures: None,
        }
    }

    /// Forward every failed scheduled Start to `tx`.
    pub fn report_failures_to(mut self, tx: mpsc::UnboundedSender<ScheduleFailure>) -> Self {
        self.failures = Some(tx);
        self
    }

    /// One poll. Returns the campaigns started by it.
    pub async fn tick(&self) -> Vec<StartReport> {
        let now = self.clock.now();
        match self.registry.start_due(now).await {
            Ok(outcome) => {
                if !outcome.started.is_empty() {
                    info!(count = outcome.started.len(), "scheduled campaigns started");
                }
                if let Some(tx) = &self.failures {
                    for (campaign_id, error) in outcome.failed {
                        // 受け手がいなくなっていたら捨てる
                        let _ = tx.send(ScheduleFailure { campaign_id, error });
                    }
                }
                outcome.started
            }
            Err(e) => {
                error!(error = %e, "failed to query scheduled campaigns");
                Vec::new()
            }
        }
    }

    /// Poll until `shutdown` flips to true (or its sender is dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        debug!("schedule loop stopped");
    }
}

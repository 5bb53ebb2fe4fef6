use std::sync::{Arc, Weak};

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::active_queues::{ActiveQueues, DeliveryContext};
use crate::domain::{DeliveryJob, LedgerEntryId};
use crate::ports::{DeliveryLedger, LedgerError};
use crate::queue::{FailureDisposition, JobLease, JobQueue};

/// Worker group handle for one campaign queue.
/// - `request_shutdown` で新しい lease を取らなくなる
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

/// Everything one worker needs. `queues` is weak so a finished campaign
/// does not keep the map alive through its own workers.
#[derive(Clone)]
pub(crate) struct WorkerDeps {
    pub queue: Arc<dyn JobQueue>,
    pub context: Arc<DeliveryContext>,
    pub queues: Weak<ActiveQueues>,
    pub generation: u64,
    pub gate: LedgerGate,
}

/// Ledger rows of one queue generation are created only through this gate.
/// `close` waits for in-flight `record` calls, after which no new row appears.
#[derive(Clone)]
pub(crate) struct LedgerGate(Arc<RwLock<bool>>);

impl LedgerGate {
    pub fn open() -> Self {
        Self(Arc::new(RwLock::new(true)))
    }

    pub async fn close(&self) {
        *self.0.write().await = false;
    }

    /// `None` once the gate is closed.
    async fn record(
        &self,
        ledger: &dyn DeliveryLedger,
        job: &DeliveryJob,
    ) -> Option<Result<LedgerEntryId, LedgerError>> {
        let open = self.0.read().await;
        if !*open {
            return None;
        }
        Some(
            ledger
                .record(&job.recipient, job.campaign_id, &job.server.name)
                .await,
        )
    }
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub(crate) fn spawn(n: usize, deps: WorkerDeps) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let deps = deps.clone();
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, deps, &mut rx).await;
            });
            joins.push(join);
        }

        Self { shutdown_tx, joins }
    }

    /// Request shutdown for all workers.
    /// In-flight sends are not cancelled; workers just stop taking new leases.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}

async fn worker_loop(worker_id: usize, deps: WorkerDeps, shutdown_rx: &mut watch::Receiver<bool>) {
    let campaign_id = deps.queue.campaign_id();
    loop {
        // shutdown が来ていたら抜ける
        if *shutdown_rx.borrow() {
            break;
        }

        // lease は「待つ」ので select で shutdown と競合させる
        let lease = tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender が落ちた = グループごと破棄された
                if changed.is_err() {
                    break;
                }
                continue;
            }
            lease = deps.queue.lease() => lease,
        };

        // None = queue が close された
        let Some(lease) = lease else {
            break;
        };

        let terminal = process(worker_id, lease, &deps.context, &deps.gate).await;

        // 終端に達したジョブがあれば drain 判定を registry 側に依頼
        if terminal && let Some(queues) = deps.queues.upgrade() {
            queues.settle(campaign_id, deps.generation).await;
        }
    }
    debug!(worker_id, campaign_id = %campaign_id, "worker stopped");
}

/// Run one attempt. Returns true when the job reached a terminal state.
async fn process(
    worker_id: usize,
    lease: Box<dyn JobLease>,
    ctx: &DeliveryContext,
    gate: &LedgerGate,
) -> bool {
    let job = lease.job().clone(); // ledger/gateway 呼び出しに必要な分だけ owned にする
    let attempt = lease.attempt();

    // 1. Pending row（書けなければ失敗 attempt 扱い）
    let entry_id = match gate.record(ctx.ledger.as_ref(), &job).await {
        // teardown 済みの世代: 送らず、行も書かない
        None => {
            debug!(
                worker_id,
                campaign_id = %job.campaign_id,
                recipient = %job.recipient,
                "queue torn down, dropping job"
            );
            return report_failure(lease, "queue torn down".to_string())
                .await
                .is_terminal();
        }
        Some(Ok(id)) => id,
        Some(Err(e)) => {
            warn!(
                worker_id,
                campaign_id = %job.campaign_id,
                recipient = %job.recipient,
                attempt,
                error = %e,
                "ledger record failed"
            );
            return report_failure(lease, format!("ledger: {e}")).await.is_terminal();
        }
    };

    // 2. 送信
    match ctx.gateway.send(&job.server, &job.message()).await {
        Ok(()) => {
            // Sent の書き込みに失敗しても再送はしない（二重送信を避ける）
            if let Err(e) = ctx.ledger.update_status(entry_id, true).await {
                error!(entry_id = %entry_id, error = %e, "failed to mark entry sent");
            }
            if let Err(e) = lease.complete().await {
                error!(worker_id, error = %e, "complete report failed");
            }
            info!(
                campaign_id = %job.campaign_id,
                recipient = %job.recipient,
                server = %job.server.name,
                attempt,
                "delivered"
            );
            true
        }
        Err(send_err) => {
            if let Err(e) = ctx.ledger.update_status(entry_id, false).await {
                error!(entry_id = %entry_id, error = %e, "failed to update entry");
            }

            let outcome = report_failure(lease, send_err.to_string()).await;
            match outcome {
                Outcome::Retry(attempt, delay) => {
                    warn!(
                        campaign_id = %job.campaign_id,
                        recipient = %job.recipient,
                        server = %job.server.name,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %send_err,
                        "send failed, retrying"
                    );
                }
                Outcome::Exhausted(attempts) => {
                    if let Err(e) = ctx.ledger.mark_failed(entry_id).await {
                        error!(entry_id = %entry_id, error = %e, "failed to mark entry failed");
                    }
                    warn!(
                        campaign_id = %job.campaign_id,
                        recipient = %job.recipient,
                        server = %job.server.name,
                        attempts,
                        error = %send_err,
                        "giving up on recipient"
                    );
                }
                Outcome::Gone => {}
            }
            outcome.is_terminal()
        }
    }
}

enum Outcome {
    Retry(u32, std::time::Duration),
    Exhausted(u32),
    /// Queue torn down, or the report itself failed.
    Gone,
}

impl Outcome {
    fn is_terminal(&self) -> bool {
        matches!(self, Outcome::Exhausted(_))
    }
}

async fn report_failure(lease: Box<dyn JobLease>, error: String) -> Outcome {
    // 失敗を queue に反映（retry/exhaustion の判断は queue 側）
    match lease.fail(error).await {
        Ok(FailureDisposition::Retry { attempt, delay }) => Outcome::Retry(attempt, delay),
        Ok(FailureDisposition::Exhausted { attempts }) => Outcome::Exhausted(attempts),
        Ok(FailureDisposition::Discarded) => Outcome::Gone,
        Err(e) => {
            error!(error = %e, "fail report failed");
            Outcome::Gone
        }
    }
}

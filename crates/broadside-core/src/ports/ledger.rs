//! DeliveryLedger port - 配送履歴の記録
//!
//! 1 attempt = 1 row。リトライのたびに新しい row が増える（重複排除しない）。

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{CampaignId, LedgerEntry, LedgerEntryId};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger entry not found: {0}")]
    EntryNotFound(LedgerEntryId),

    #[error("ledger backend: {0}")]
    Backend(String),
}

#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// Create a Pending row for one attempt.
    async fn record(
        &self,
        recipient: &str,
        campaign_id: CampaignId,
        server_name: &str,
    ) -> Result<LedgerEntryId, LedgerError>;

    /// Sent when `success`, otherwise Pending. Always refreshes the timestamp.
    async fn update_status(
        &self,
        id: LedgerEntryId,
        success: bool,
    ) -> Result<LedgerEntry, LedgerError>;

    /// Terminal failure after the job exhausted its attempts.
    async fn mark_failed(&self, id: LedgerEntryId) -> Result<LedgerEntry, LedgerError>;

    /// All rows of a campaign in insertion (dispatch) order.
    async fn query_by_campaign(&self, campaign_id: CampaignId)
    -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Bulk delete on campaign deletion. Returns the number of rows removed.
    async fn delete_by_campaign(&self, campaign_id: CampaignId) -> Result<usize, LedgerError>;
}

//! Delivery ledger rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CampaignId, LedgerEntryId};

/// Outcome of one delivery attempt as recorded in the ledger.
///
/// - `Pending`: attempt started or failed (a retry may follow)
/// - `Sent`: the gateway accepted the message
/// - `Failed`: the job exhausted its attempts; no further writes happen
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn code(self) -> u8 {
        match self {
            DeliveryStatus::Pending => 0,
            DeliveryStatus::Sent => 1,
            DeliveryStatus::Failed => 2,
        }
    }
}

/// One ledger row. Retried jobs produce several rows for the same recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub recipient: String,
    pub campaign_id: CampaignId,
    pub server_name: String,
    pub status: DeliveryStatus,
    /// Last status change.
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn pending(
        id: LedgerEntryId,
        recipient: impl Into<String>,
        campaign_id: CampaignId,
        server_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            recipient: recipient.into(),
            campaign_id,
            server_name: server_name.into(),
            status: DeliveryStatus::Pending,
            timestamp: now,
            created_at: now,
        }
    }

    pub fn set_status(&mut self, status: DeliveryStatus, now: DateTime<Utc>) {
        self.status = status;
        self.timestamp = now;
    }
}

/// Delivery log row exposed to callers of `delivery_log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub recipient: String,
    pub server_name: String,
    pub status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
}

impl From<LedgerEntry> for DeliveryRecord {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            recipient: entry.recipient,
            server_name: entry.server_name,
            status: entry.status,
            timestamp: entry.timestamp,
        }
    }
}

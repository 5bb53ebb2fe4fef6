//! InMemoryLedger - 開発・テスト用の配送履歴

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{CampaignId, DeliveryStatus, LedgerEntry, LedgerEntryId};
use crate::ports::{Clock, DeliveryLedger, IdGenerator, LedgerError};

/// Append-only row list. Insertion order is dispatch order.
pub struct InMemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLedger {
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            ids,
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    async fn transition(
        &self,
        id: LedgerEntryId,
        status: DeliveryStatus,
    ) -> Result<LedgerEntry, LedgerError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(LedgerError::EntryNotFound(id))?;
        entry.set_status(status, now);
        Ok(entry.clone())
    }
}

#[async_trait]
impl DeliveryLedger for InMemoryLedger {
    async fn record(
        &self,
        recipient: &str,
        campaign_id: CampaignId,
        server_name: &str,
    ) -> Result<LedgerEntryId, LedgerError> {
        let id = self.ids.generate_entry_id();
        let entry = LedgerEntry::pending(id, recipient, campaign_id, server_name, self.clock.now());
        self.entries.lock().await.push(entry);
        Ok(id)
    }

    async fn update_status(
        &self,
        id: LedgerEntryId,
        success: bool,
    ) -> Result<LedgerEntry, LedgerError> {
        let status = if success {
            DeliveryStatus::Sent
        } else {
            DeliveryStatus::Pending
        };
        self.transition(id, status).await
    }

    async fn mark_failed(&self, id: LedgerEntryId) -> Result<LedgerEntry, LedgerError> {
        self.transition(id, DeliveryStatus::Failed).await
    }

    async fn query_by_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|entry| entry.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn delete_by_campaign(&self, campaign_id: CampaignId) -> Result<usize, LedgerError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|entry| entry.campaign_id != campaign_id);
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, UlidGenerator};
    use chrono::{Duration, TimeZone, Utc};

    fn ledger() -> (Arc<FixedClock>, InMemoryLedger) {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        let ledger = InMemoryLedger::new(ids, clock.clone());
        (clock, ledger)
    }

    #[tokio::test]
    async fn record_then_update() {
        let (clock, ledger) = ledger();
        let cid = CampaignId::generate();

        let id = ledger.record("a@x.com", cid, "S1").await.unwrap();
        clock.advance(Duration::seconds(5));
        let entry = ledger.update_status(id, true).await.unwrap();

        assert_eq!(entry.status, DeliveryStatus::Sent);
        assert_eq!(entry.server_name, "S1");
        assert_eq!(entry.timestamp - entry.created_at, Duration::seconds(5));
    }

    #[tokio::test]
    async fn failed_update_stays_pending_until_marked_failed() {
        let (_clock, ledger) = ledger();
        let cid = CampaignId::generate();

        let id = ledger.record("a@x.com", cid, "S1").await.unwrap();
        let entry = ledger.update_status(id, false).await.unwrap();
        assert_eq!(entry.status, DeliveryStatus::Pending);

        let entry = ledger.mark_failed(id).await.unwrap();
        assert_eq!(entry.status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_entry() {
        let (_clock, ledger) = ledger();
        let err = ledger
            .update_status(LedgerEntryId::generate(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::EntryNotFound(_)));
    }

    #[tokio::test]
    async fn query_and_delete_are_scoped_to_campaign() {
        let (_clock, ledger) = ledger();
        let (c1, c2) = (CampaignId::generate(), CampaignId::generate());

        ledger.record("a@x.com", c1, "S1").await.unwrap();
        ledger.record("b@x.com", c2, "S1").await.unwrap();
        ledger.record("a@x.com", c1, "S2").await.unwrap();

        let rows = ledger.query_by_campaign(c1).await.unwrap();
        let servers: Vec<_> = rows.iter().map(|r| r.server_name.as_str()).collect();
        assert_eq!(servers, vec!["S1", "S2"]);

        assert_eq!(ledger.delete_by_campaign(c1).await.unwrap(), 2);
        assert!(ledger.query_by_campaign(c1).await.unwrap().is_empty());
        assert_eq!(ledger.len().await, 1);
    }
}

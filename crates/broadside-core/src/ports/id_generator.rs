//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock ベースの ULID

use crate::domain::ids::{CampaignId, JobId, LedgerEntryId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は engine が発行する ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（worker から並行に呼ばれる）
pub trait IdGenerator: Send + Sync {
    fn generate_campaign_id(&self) -> CampaignId;

    fn generate_job_id(&self) -> JobId;

    fn generate_entry_id(&self) -> LedgerEntryId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock の時刻を timestamp 部に使うため、FixedClock と組み合わせると
/// timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_campaign_id(&self) -> CampaignId {
        CampaignId::from(self.next_ulid())
    }

    fn generate_job_id(&self) -> JobId {
        JobId::from(self.next_ulid())
    }

    fn generate_entry_id(&self) -> LedgerEntryId {
        LedgerEntryId::from(self.next_ulid())
    }
}

//! CampaignStore port - campaign / template / recipient の正本
//!
//! engine はここから campaign を解決し、status を書き戻すだけ。
//! 作成・編集・list 管理は外側のアプリケーションの責務。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Campaign, CampaignDefinition, CampaignId, CampaignStatus, ServerId, TemplateId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("campaign not found: {0}")]
    CampaignNotFound(CampaignId),

    #[error("template not found: {0}")]
    TemplateNotFound(TemplateId),

    #[error("outbound server not found: {0}")]
    ServerNotFound(ServerId),

    #[error("campaign store backend: {0}")]
    Backend(String),
}

/// CampaignStore は campaign の解決と status の永続化を担う
///
/// # 設計原則
/// - `resolve` は recipient を list 参照から flat な配列に展開する（順序 = 配送順）
/// - server credential は解決時点のスナップショットを返す
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError>;

    /// Resolve subject, rendered body, recipients and server pool.
    async fn resolve(&self, id: CampaignId) -> Result<CampaignDefinition, StoreError>;

    async fn set_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
    ) -> Result<Campaign, StoreError>;

    /// Set status to Scheduled and record the requested time.
    async fn set_schedule(
        &self,
        id: CampaignId,
        at: DateTime<Utc>,
    ) -> Result<Campaign, StoreError>;

    /// Returns false when nothing was deleted.
    async fn delete(&self, id: CampaignId) -> Result<bool, StoreError>;

    /// Scheduled campaigns whose time has come, oldest schedule first.
    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<CampaignId>, StoreError>;
}

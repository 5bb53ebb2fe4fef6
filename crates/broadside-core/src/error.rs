use thiserror::Error;

use crate::domain::{CampaignId, TemplateId};
use crate::ports::{LedgerError, StoreError};
use crate::queue::QueueError;

/// Errors returned by registry commands.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("campaign not found: {0}")]
    NotFound(CampaignId),

    #[error("template not found: {0}")]
    TemplateNotFound(TemplateId),

    #[error("campaign {0} has no recipients")]
    NoRecipients(CampaignId),

    #[error("campaign {0} has no outbound servers")]
    NoServers(CampaignId),

    #[error("campaign {0} already has a live queue")]
    AlreadyRunning(CampaignId),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CampaignNotFound(id) => EngineError::NotFound(id),
            StoreError::TemplateNotFound(id) => EngineError::TemplateNotFound(id),
            other => EngineError::Store(other),
        }
    }
}

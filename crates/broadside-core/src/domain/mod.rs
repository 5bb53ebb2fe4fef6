//! Domain model (ids, campaigns, credentials, jobs, ledger rows).
//!
//! ここには queue や store の前提を持ち込まない（純粋なデータと遷移のみ）。

pub mod campaign;
pub mod ids;
pub mod job;
pub mod ledger;
pub mod recipient;
pub mod server;

pub use campaign::{Campaign, CampaignDefinition, CampaignStatus, Template};
pub use ids::{
    CampaignId, JobId, LedgerEntryId, ListId, OwnerId, ServerId, SubscriberId, TemplateId,
};
pub use job::{DeliveryJob, OutboundMessage, assign_server};
pub use ledger::{DeliveryRecord, DeliveryStatus, LedgerEntry};
pub use recipient::Recipient;
pub use server::{ServerCredential, TransportSecurity};

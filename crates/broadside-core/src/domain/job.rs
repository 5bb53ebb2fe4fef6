//! Delivery job: one recipient of one campaign, bound to one server.

use serde::{Deserialize, Serialize};

use super::campaign::CampaignDefinition;
use super::ids::{CampaignId, JobId};
use super::server::ServerCredential;

/// One queued unit of work.
///
/// Design:
/// - 生成は Start 時のみ（queue の外には永続化しない）
/// - `server` は Start 時点の credential のスナップショット
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub job_id: JobId,
    pub campaign_id: CampaignId,

    /// Index of the recipient in the resolved recipient list.
    pub position: usize,

    pub recipient: String,
    pub server: ServerCredential,
    pub subject: String,
    pub body: String,
}

/// Outbound message handed to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl DeliveryJob {
    pub fn message(&self) -> OutboundMessage {
        OutboundMessage {
            to: self.recipient.clone(),
            subject: self.subject.clone(),
            html: self.body.clone(),
        }
    }

    /// Expand a resolved campaign into one job per recipient.
    ///
    /// Recipient `i` is bound to `servers[i % servers.len()]` (static
    /// round-robin). Returns an empty vec when either side is empty; callers
    /// reject that case before planning.
    pub fn plan(
        definition: &CampaignDefinition,
        mut next_id: impl FnMut() -> JobId,
    ) -> Vec<DeliveryJob> {
        definition
            .recipients
            .iter()
            .enumerate()
            .filter_map(|(position, recipient)| {
                let server = assign_server(&definition.servers, position)?;
                Some(DeliveryJob {
                    job_id: next_id(),
                    campaign_id: definition.id(),
                    position,
                    recipient: recipient.email.clone(),
                    server: server.clone(),
                    subject: definition.subject.clone(),
                    body: definition.body.clone(),
                })
            })
            .collect()
    }
}

/// Round-robin server for the recipient at `position`.
pub fn assign_server(pool: &[ServerCredential], position: usize) -> Option<&ServerCredential> {
    if pool.is_empty() {
        return None;
    }
    pool.get(position % pool.len())
}

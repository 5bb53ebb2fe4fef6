//! Campaign record and lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CampaignId, ListId, OwnerId, ServerId, TemplateId};
use super::recipient::Recipient;
use super::server::ServerCredential;

/// Coarse lifecycle state of a campaign.
///
/// The numeric codes are stable (they are what the surrounding application
/// stores), so never reorder the variants.
///
/// Transitions are triggered by registry commands only, plus
/// `Running -> Completed` from the queue's drain detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Created,
    Running,
    Completed,
    Paused,
    Terminated,
    Scheduled,
}

impl CampaignStatus {
    pub fn code(self) -> u8 {
        match self {
            CampaignStatus::Created => 0,
            CampaignStatus::Running => 1,
            CampaignStatus::Completed => 2,
            CampaignStatus::Paused => 3,
            CampaignStatus::Terminated => 4,
            CampaignStatus::Scheduled => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        let status = match code {
            0 => CampaignStatus::Created,
            1 => CampaignStatus::Running,
            2 => CampaignStatus::Completed,
            3 => CampaignStatus::Paused,
            4 => CampaignStatus::Terminated,
            5 => CampaignStatus::Scheduled,
            _ => return None,
        };
        Some(status)
    }
}

/// Message template. The engine sends `content` as-is (no personalization).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    pub content: String,
}

/// Campaign record: the engine reads it and mutates `status` / `scheduled_for`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub subject: String,

    /// Server pool, in round-robin order.
    pub servers: Vec<ServerId>,
    pub template: TemplateId,
    pub lists: Vec<ListId>,
    pub owner: OwnerId,

    pub status: CampaignStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: CampaignId,
        name: impl Into<String>,
        subject: impl Into<String>,
        servers: Vec<ServerId>,
        template: TemplateId,
        lists: Vec<ListId>,
        owner: OwnerId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            subject: subject.into(),
            servers,
            template,
            lists,
            owner,
            status: CampaignStatus::Created,
            scheduled_for: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: CampaignStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }

    /// Record a schedule. Nothing wakes the campaign up by itself; see `ScheduleLoop`.
    pub fn schedule(&mut self, at: DateTime<Utc>, now: DateTime<Utc>) {
        self.status = CampaignStatus::Scheduled;
        self.scheduled_for = Some(at);
        self.updated_at = now;
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == CampaignStatus::Scheduled
            && self.scheduled_for.is_some_and(|at| at <= now)
    }
}

/// A campaign resolved to everything the dispatch engine needs to start it.
///
/// `servers` is a snapshot taken at resolution time; jobs carry their own
/// copy, so editing a credential later does not affect a running campaign.
#[derive(Debug, Clone)]
pub struct CampaignDefinition {
    pub campaign: Campaign,
    pub subject: String,
    /// Rendered message body (HTML).
    pub body: String,
    /// Flat recipient list in dispatch order.
    pub recipients: Vec<Recipient>,
    pub servers: Vec<ServerCredential>,
}

impl CampaignDefinition {
    pub fn id(&self) -> CampaignId {
        self.campaign.id
    }
}

//! InMemoryCampaignStore - 開発・テスト用の campaign 正本
//!
//! # 実装詳細
//! - tokio RwLock 1 つで campaign / template / server / recipient を保持
//! - recipient は挿入順の Vec（resolve の順序 = list 順 → 挿入順）

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::{
    Campaign, CampaignDefinition, CampaignId, CampaignStatus, Recipient, ServerCredential,
    ServerId, Template, TemplateId,
};
use crate::ports::{CampaignStore, Clock, StoreError};

#[derive(Default)]
struct StoreState {
    campaigns: HashMap<CampaignId, Campaign>,
    templates: HashMap<TemplateId, Template>,
    servers: HashMap<ServerId, ServerCredential>,
    recipients: Vec<Recipient>,
}

pub struct InMemoryCampaignStore {
    state: RwLock<StoreState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCampaignStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            clock,
        }
    }

    pub async fn insert_campaign(&self, campaign: Campaign) {
        let mut state = self.state.write().await;
        state.campaigns.insert(campaign.id, campaign);
    }

    pub async fn insert_template(&self, template: Template) {
        let mut state = self.state.write().await;
        state.templates.insert(template.id, template);
    }

    pub async fn insert_server(&self, server: ServerCredential) {
        let mut state = self.state.write().await;
        state.servers.insert(server.id, server);
    }

    pub async fn insert_recipients(&self, recipients: impl IntoIterator<Item = Recipient>) {
        let mut state = self.state.write().await;
        state.recipients.extend(recipients);
    }

    /// Update the stored credential (e.g. rotate a secret).
    /// Running campaigns keep the snapshot taken at Start.
    pub async fn update_server(&self, server: ServerCredential) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let slot = state
            .servers
            .get_mut(&server.id)
            .ok_or(StoreError::ServerNotFound(server.id))?;
        *slot = server;
        Ok(())
    }

    async fn update<F>(&self, id: CampaignId, f: F) -> Result<Campaign, StoreError>
    where
        F: FnOnce(&mut Campaign, DateTime<Utc>),
    {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let campaign = state
            .campaigns
            .get_mut(&id)
            .ok_or(StoreError::CampaignNotFound(id))?;
        f(campaign, now);
        Ok(campaign.clone())
    }
}

#[async_trait]
impl CampaignStore for InMemoryCampaignStore {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError> {
        let state = self.state.read().await;
        Ok(state.campaigns.get(&id).cloned())
    }

    async fn resolve(&self, id: CampaignId) -> Result<CampaignDefinition, StoreError> {
        let state = self.state.read().await;
        let campaign = state
            .campaigns
            .get(&id)
            .ok_or(StoreError::CampaignNotFound(id))?
            .clone();

        let template = state
            .templates
            .get(&campaign.template)
            .ok_or(StoreError::TemplateNotFound(campaign.template))?;

        // 参照先が消えていたらエラー、inactive は黙って外す
        let mut servers = Vec::with_capacity(campaign.servers.len());
        for server_id in &campaign.servers {
            let server = state
                .servers
                .get(server_id)
                .ok_or(StoreError::ServerNotFound(*server_id))?;
            if server.active {
                servers.push(server.clone());
            }
        }

        let recipients = campaign
            .lists
            .iter()
            .flat_map(|list| state.recipients.iter().filter(move |r| r.list == *list))
            .cloned()
            .collect();

        Ok(CampaignDefinition {
            subject: campaign.subject.clone(),
            body: template.content.clone(),
            recipients,
            servers,
            campaign,
        })
    }

    async fn set_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
    ) -> Result<Campaign, StoreError> {
        self.update(id, |campaign, now| campaign.set_status(status, now))
            .await
    }

    async fn set_schedule(
        &self,
        id: CampaignId,
        at: DateTime<Utc>,
    ) -> Result<Campaign, StoreError> {
        self.update(id, |campaign, now| campaign.schedule(at, now))
            .await
    }

    async fn delete(&self, id: CampaignId) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(state.campaigns.remove(&id).is_some())
    }

    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<CampaignId>, StoreError> {
        let state = self.state.read().await;
        let mut due: Vec<&Campaign> = state
            .campaigns
            .values()
            .filter(|campaign| campaign.is_due(now))
            .collect();
        due.sort_by_key(|campaign| (campaign.scheduled_for, campaign.id));
        Ok(due.into_iter().map(|campaign| campaign.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ListId, OwnerId, SubscriberId, TransportSecurity};
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn server(name: &str, owner: OwnerId) -> ServerCredential {
        ServerCredential {
            id: ServerId::generate(),
            name: name.to_string(),
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "news@example.com".to_string(),
            secret: "pw".to_string(),
            security: TransportSecurity::Tls,
            owner,
            active: true,
        }
    }

    struct Seeded {
        store: InMemoryCampaignStore,
        campaign_id: CampaignId,
        s1: ServerCredential,
    }

    async fn seeded() -> Seeded {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(now()));
        let store = InMemoryCampaignStore::new(clock);
        let owner = OwnerId::generate();

        let s1 = server("S1", owner);
        let s2 = server("S2", owner);
        store.insert_server(s1.clone()).await;
        store.insert_server(s2.clone()).await;

        let template = Template {
            id: TemplateId::generate(),
            name: "promo".to_string(),
            content: "<h1>Sale</h1>".to_string(),
        };
        store.insert_template(template.clone()).await;

        let (l1, l2) = (ListId::generate(), ListId::generate());
        store
            .insert_recipients(vec![
                Recipient::new(SubscriberId::generate(), "c@x.com", l2),
                Recipient::new(SubscriberId::generate(), "a@x.com", l1),
                Recipient::new(SubscriberId::generate(), "b@x.com", l1),
                Recipient::new(SubscriberId::generate(), "z@x.com", ListId::generate()),
            ])
            .await;

        let campaign = Campaign::new(
            CampaignId::generate(),
            "spring",
            "20% off",
            vec![s1.id, s2.id],
            template.id,
            vec![l1, l2],
            owner,
            now(),
        );
        let campaign_id = campaign.id;
        store.insert_campaign(campaign).await;

        Seeded {
            store,
            campaign_id,
            s1,
        }
    }

    #[tokio::test]
    async fn resolve_expands_lists_in_order() {
        let Seeded {
            store, campaign_id, ..
        } = seeded().await;

        let def = store.resolve(campaign_id).await.unwrap();

        let emails: Vec<_> = def.recipients.iter().map(|r| r.email.as_str()).collect();
        assert_eq!(emails, vec!["a@x.com", "b@x.com", "c@x.com"]);
        assert_eq!(def.subject, "20% off");
        assert_eq!(def.body, "<h1>Sale</h1>");
        let names: Vec<_> = def.servers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["S1", "S2"]);
    }

    #[tokio::test]
    async fn resolve_skips_inactive_servers() {
        let Seeded {
            store,
            campaign_id,
            mut s1,
        } = seeded().await;
        s1.active = false;
        store.update_server(s1).await.unwrap();

        let def = store.resolve(campaign_id).await.unwrap();
        assert_eq!(def.servers.len(), 1);
        assert_eq!(def.servers[0].name, "S2");
    }

    #[tokio::test]
    async fn resolve_unknown_campaign() {
        let Seeded { store, .. } = seeded().await;
        let err = store.resolve(CampaignId::generate()).await.unwrap_err();
        assert!(matches!(err, StoreError::CampaignNotFound(_)));
    }

    #[tokio::test]
    async fn status_and_schedule_updates() {
        let Seeded {
            store, campaign_id, ..
        } = seeded().await;

        let c = store
            .set_status(campaign_id, CampaignStatus::Running)
            .await
            .unwrap();
        assert_eq!(c.status, CampaignStatus::Running);

        let at = now() + Duration::minutes(30);
        store.set_schedule(campaign_id, at).await.unwrap();

        assert!(store.due_scheduled(now()).await.unwrap().is_empty());
        assert_eq!(
            store.due_scheduled(at).await.unwrap(),
            vec![campaign_id]
        );
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_was_removed() {
        let Seeded {
            store, campaign_id, ..
        } = seeded().await;

        assert!(store.delete(campaign_id).await.unwrap());
        assert!(!store.delete(campaign_id).await.unwrap());
        assert!(store.get(campaign_id).await.unwrap().is_none());
    }
}

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Semaphore;

use broadside_core::domain::{
    Campaign, CampaignId, CampaignStatus, DeliveryStatus, ListId, OutboundMessage, OwnerId,
    Recipient, ServerCredential, ServerId, SubscriberId, Template, TemplateId, TransportSecurity,
};
use broadside_core::impls::{InMemoryCampaignStore, InMemoryLedger};
use broadside_core::ports::{
    CampaignStore, DeliveryGateway, DeliveryLedger, FixedClock, GatewayError, IdGenerator,
    UlidGenerator,
};
use broadside_core::queue::QueueFactory;
use broadside_core::{CampaignRegistry, EngineConfig, RegistryBuilder};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub struct Harness {
    pub registry: CampaignRegistry,
    pub store: Arc<InMemoryCampaignStore>,
    pub ledger: Arc<dyn DeliveryLedger>,
    pub clock: Arc<FixedClock>,
}

type WrapStore = Box<dyn FnOnce(Arc<InMemoryCampaignStore>) -> Arc<dyn CampaignStore>>;

pub struct HarnessBuilder {
    gateway: Arc<dyn DeliveryGateway>,
    ledger: Option<Arc<dyn DeliveryLedger>>,
    queue_factory: Option<Arc<dyn QueueFactory>>,
    wrap_store: Option<WrapStore>,
    config: EngineConfig,
}

impl HarnessBuilder {
    pub fn new(gateway: Arc<dyn DeliveryGateway>) -> Self {
        Self {
            gateway,
            ledger: None,
            queue_factory: None,
            wrap_store: None,
            config: EngineConfig::default(),
        }
    }

    pub fn ledger(mut self, ledger: Arc<dyn DeliveryLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn queue_factory(mut self, factory: Arc<dyn QueueFactory>) -> Self {
        self.queue_factory = Some(factory);
        self
    }

    /// The registry sees the wrapped store; seeding still goes to the inner one.
    pub fn wrap_store(
        mut self,
        wrap: impl FnOnce(Arc<InMemoryCampaignStore>) -> Arc<dyn CampaignStore> + 'static,
    ) -> Self {
        self.wrap_store = Some(Box::new(wrap));
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.worker.concurrency = n;
        self
    }

    pub fn build(self) -> Harness {
        let clock = Arc::new(FixedClock::new(t0()));
        let store = Arc::new(InMemoryCampaignStore::new(clock.clone()));
        let ledger = self
            .ledger
            .unwrap_or_else(|| in_memory_ledger(clock.clone()));

        let registry_store: Arc<dyn CampaignStore> = match self.wrap_store {
            Some(wrap) => wrap(store.clone()),
            None => store.clone(),
        };

        let mut builder = RegistryBuilder::new()
            .config(self.config)
            .store(registry_store)
            .ledger(ledger.clone())
            .gateway(self.gateway)
            .clock(clock.clone());
        if let Some(factory) = self.queue_factory {
            builder = builder.queue_factory(factory);
        }

        Harness {
            registry: builder.build().unwrap(),
            store,
            ledger,
            clock,
        }
    }
}

pub fn in_memory_ledger(clock: Arc<FixedClock>) -> Arc<dyn DeliveryLedger> {
    let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(clock.clone()));
    Arc::new(InMemoryLedger::new(ids, clock))
}

pub struct Seeded {
    pub campaign_id: CampaignId,
    pub servers: Vec<ServerCredential>,
}

impl Harness {
    /// One list, one template, servers named after `servers`.
    pub async fn seed(&self, recipients: &[&str], servers: &[&str]) -> Seeded {
        let owner = OwnerId::generate();

        let template = Template {
            id: TemplateId::generate(),
            name: "promo".to_string(),
            content: "<p>Sale</p>".to_string(),
        };
        self.store.insert_template(template.clone()).await;

        let mut credentials = Vec::new();
        for name in servers {
            let credential = server(name, owner);
            self.store.insert_server(credential.clone()).await;
            credentials.push(credential);
        }

        let list = ListId::generate();
        self.store
            .insert_recipients(
                recipients
                    .iter()
                    .map(|email| Recipient::new(SubscriberId::generate(), *email, list)),
            )
            .await;

        let campaign = Campaign::new(
            CampaignId::generate(),
            "spring",
            "20% off",
            credentials.iter().map(|c| c.id).collect(),
            template.id,
            vec![list],
            owner,
            t0(),
        );
        let campaign_id = campaign.id;
        self.store.insert_campaign(campaign).await;

        Seeded {
            campaign_id,
            servers: credentials,
        }
    }

    pub async fn status(&self, id: CampaignId) -> CampaignStatus {
        self.registry.status(id).await.unwrap().status
    }

    /// Poll (in virtual time) until the campaign reaches `want`.
    pub async fn wait_for_status(&self, id: CampaignId, want: CampaignStatus) {
        for _ in 0..2_000 {
            if self.status(id).await == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("campaign {id} never reached {want:?}");
    }

    /// (recipient, server, status) rows in dispatch order.
    pub async fn log(&self, id: CampaignId) -> Vec<(String, String, DeliveryStatus)> {
        self.registry
            .delivery_log(id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.recipient, r.server_name, r.status))
            .collect()
    }
}

pub fn server(name: &str, owner: OwnerId) -> ServerCredential {
    ServerCredential {
        id: ServerId::generate(),
        name: name.to_string(),
        host: format!("{}.example.com", name.to_lowercase()),
        port: 587,
        username: "news@example.com".to_string(),
        secret: "initial-secret".to_string(),
        security: TransportSecurity::Tls,
        owner,
        active: true,
    }
}

pub fn row(recipient: &str, server: &str, status: DeliveryStatus) -> (String, String, DeliveryStatus) {
    (recipient.to_string(), server.to_string(), status)
}

/// Gateway that parks every send until a permit is released.
pub struct GatedGateway {
    gate: Semaphore,
    entered: AtomicUsize,
    /// (recipient, server name, secret) of completed sends.
    sent: Mutex<Vec<(String, String, String)>>,
}

impl GatedGateway {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            entered: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub async fn wait_entered(&self, n: usize) {
        for _ in 0..2_000 {
            if self.entered() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("gateway never saw {n} sends");
    }
}

#[async_trait]
impl DeliveryGateway for GatedGateway {
    async fn send(
        &self,
        server: &ServerCredential,
        message: &OutboundMessage,
    ) -> Result<(), GatewayError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        permit.forget();
        self.sent.lock().unwrap().push((
            message.to.clone(),
            server.name.clone(),
            server.secret.clone(),
        ));
        Ok(())
    }
}

//! RegistryBuilder - registry の構築とワイヤリング
//!
//! # 起動時検証（Fail-fast）
//! - 必須コンポーネント（store, gateway）が揃っているか
//! - config の値が妥当か
//!
//! 足りないものは build() でまとめて BuildError として返す。

use std::sync::Arc;

use super::active_queues::{ActiveQueues, DeliveryContext};
use super::registry::{CampaignRegistry, RegistryInner};
use crate::config::{ConfigError, EngineConfig};
use crate::impls::InMemoryLedger;
use crate::ports::{
    CampaignStore, Clock, DeliveryGateway, DeliveryLedger, IdGenerator, SystemClock, UlidGenerator,
};
use crate::queue::{InMemoryQueueFactory, QueueFactory, RetryPolicy};

/// RegistryBuilder は CampaignRegistry を構築
///
/// # 使用例
/// ```ignore
/// let registry = RegistryBuilder::new()
///     .config(config)
///     .store(store)
///     .gateway(Arc::new(SmtpGateway::new(timeout)))
///     .build()?;
/// ```
///
/// 省略時のデフォルト:
/// - clock: SystemClock
/// - ids: UlidGenerator(clock)
/// - ledger: InMemoryLedger
/// - queue_factory: InMemoryQueueFactory（config.retry から RetryPolicy）
#[derive(Default)]
pub struct RegistryBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn CampaignStore>>,
    ledger: Option<Arc<dyn DeliveryLedger>>,
    gateway: Option<Arc<dyn DeliveryGateway>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    queue_factory: Option<Arc<dyn QueueFactory>>,
}

/// BuildError は registry 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing components: {0:?}. These must be provided before build().")]
    MissingComponents(Vec<&'static str>),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn CampaignStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn DeliveryLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn DeliveryGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Overrides the retry policy taken from the config.
    pub fn queue_factory(mut self, factory: Arc<dyn QueueFactory>) -> Self {
        self.queue_factory = Some(factory);
        self
    }

    /// Must be called inside a tokio runtime only when campaigns are started.
    pub fn build(self) -> Result<CampaignRegistry, BuildError> {
        self.config.validate()?;

        let mut missing = Vec::new();
        if self.store.is_none() {
            missing.push("store");
        }
        if self.gateway.is_none() {
            missing.push("gateway");
        }
        let (Some(store), Some(gateway)) = (self.store, self.gateway) else {
            return Err(BuildError::MissingComponents(missing));
        };

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let ids = self.ids.unwrap_or_else(|| {
            Arc::new(UlidGenerator::new(Arc::clone(&clock))) as Arc<dyn IdGenerator>
        });
        let ledger = self.ledger.unwrap_or_else(|| {
            Arc::new(InMemoryLedger::new(Arc::clone(&ids), Arc::clone(&clock)))
                as Arc<dyn DeliveryLedger>
        });
        let factory = self.queue_factory.unwrap_or_else(|| {
            Arc::new(InMemoryQueueFactory::new(RetryPolicy::from(&self.config.retry)))
                as Arc<dyn QueueFactory>
        });

        let context = DeliveryContext {
            store: Arc::clone(&store),
            ledger: Arc::clone(&ledger),
            gateway,
        };
        let queues = Arc::new(ActiveQueues::new(
            context,
            factory,
            self.config.worker.concurrency,
        ));

        Ok(CampaignRegistry::from_inner(RegistryInner {
            store,
            ledger,
            ids,
            clock,
            queues,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::impls::{DryRunGateway, InMemoryCampaignStore};

    fn store() -> Arc<dyn CampaignStore> {
        Arc::new(InMemoryCampaignStore::new(Arc::new(SystemClock)))
    }

    #[test]
    fn test_build_success() {
        let registry = RegistryBuilder::new()
            .store(store())
            .gateway(Arc::new(DryRunGateway::new()))
            .build();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_build_missing_components() {
        let registry = RegistryBuilder::new().build();
        assert!(matches!(
            registry,
            Err(BuildError::MissingComponents(missing)) if missing == vec!["store", "gateway"]
        ));
    }

    #[test]
    fn test_build_missing_gateway_only() {
        let registry = RegistryBuilder::new().store(store()).build();
        assert!(matches!(
            registry,
            Err(BuildError::MissingComponents(missing)) if missing == vec!["gateway"]
        ));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = EngineConfig {
            worker: WorkerConfig { concurrency: 0 },
            ..EngineConfig::default()
        };
        let registry = RegistryBuilder::new()
            .config(config)
            .store(store())
            .gateway(Arc::new(DryRunGateway::new()))
            .build();
        assert!(matches!(registry, Err(BuildError::InvalidConfig(_))));
    }
}

//! Observability: queue counters, campaign status views, and log setup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{ConfigError, LoggingConfig};
use crate::domain::{CampaignId, CampaignStatus};

/// Per-state job counts of one campaign queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: usize,
    pub active: usize,
    pub delayed: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueCounts {
    /// Nothing left to run: no waiting, active, or delayed jobs.
    pub fn is_drained(&self) -> bool {
        self.waiting == 0 && self.active == 0 && self.delayed == 0
    }

    pub fn total(&self) -> usize {
        self.waiting + self.active + self.delayed + self.completed + self.failed
    }
}

/// Status view of one campaign.
///
/// `queue` is `None` when no queue is live (never started, paused-then-
/// terminated, completed, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSnapshot {
    pub campaign_id: CampaignId,
    pub status: CampaignStatus,
    pub queue: Option<QueueCounts>,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `logging.level` when set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ConfigError::Invalid(format!("logging.level: {e}")))?;

    let result = if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().flatten_event(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .try_init()
    };

    result.map_err(|e| ConfigError::Invalid(format!("tracing already initialized: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drained_ignores_terminal_counts() {
        let counts = QueueCounts {
            completed: 4,
            failed: 1,
            ..QueueCounts::default()
        };
        assert!(counts.is_drained());
        assert_eq!(counts.total(), 5);
    }

    #[test]
    fn delayed_jobs_are_not_drained() {
        let counts = QueueCounts {
            delayed: 1,
            ..QueueCounts::default()
        };
        assert!(!counts.is_drained());
    }
}

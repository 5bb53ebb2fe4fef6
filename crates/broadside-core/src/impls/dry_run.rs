//! DryRunGateway - 送信せずにログだけ出す gateway
//!
//! recipient ごとに「最初の n 回は失敗」を仕込めるので、
//! CLI のデモとテストでリトライ経路を再現できる。

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::domain::{OutboundMessage, ServerCredential};
use crate::ports::{DeliveryGateway, GatewayError};

/// One accepted send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub server_name: String,
    pub to: String,
    pub subject: String,
}

#[derive(Debug, Clone, Copy)]
enum Script {
    FailFirst(u32),
    FailAlways,
}

#[derive(Default)]
struct DryRunState {
    attempts: HashMap<String, u32>,
    sent: Vec<SentMessage>,
}

#[derive(Default)]
pub struct DryRunGateway {
    scripts: HashMap<String, Script>,
    latency: Option<Duration>,
    state: Mutex<DryRunState>,
}

impl DryRunGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first `times` sends to `recipient` fail, later ones succeed.
    pub fn fail_first(mut self, recipient: impl Into<String>, times: u32) -> Self {
        self.scripts.insert(recipient.into(), Script::FailFirst(times));
        self
    }

    /// Every send to `recipient` fails.
    pub fn fail_always(mut self, recipient: impl Into<String>) -> Self {
        self.scripts.insert(recipient.into(), Script::FailAlways);
        self
    }

    /// Sleep before each send.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Messages accepted so far, in send order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .clone()
    }

    /// Number of send calls (successful or not) for `recipient`.
    pub fn attempts(&self, recipient: &str) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .attempts
            .get(recipient)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl DeliveryGateway for DryRunGateway {
    async fn send(
        &self,
        server: &ServerCredential,
        message: &OutboundMessage,
    ) -> Result<(), GatewayError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let attempt = {
            let counter = state.attempts.entry(message.to.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        let fails = match self.scripts.get(&message.to) {
            Some(Script::FailAlways) => true,
            Some(Script::FailFirst(times)) => attempt <= *times,
            None => false,
        };
        if fails {
            return Err(GatewayError::Transport(format!(
                "dry-run: scripted failure #{attempt} for {}",
                message.to
            )));
        }

        info!(
            server = %server.name,
            recipient = %message.to,
            subject = %message.subject,
            "dry-run send"
        );
        state.sent.push(SentMessage {
            server_name: server.name.clone(),
            to: message.to.clone(),
            subject: message.subject.clone(),
        });
        Ok(())
    }
}

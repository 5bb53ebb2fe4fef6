//! SmtpGateway - lettre による SMTP 送信
//!
//! 1 send = 1 transport。接続プールは持たない。

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::debug;

use crate::domain::{OutboundMessage, ServerCredential, TransportSecurity};
use crate::ports::{DeliveryGateway, GatewayError};

#[derive(Debug, Clone)]
pub struct SmtpGateway {
    timeout: Duration,
}

impl SmtpGateway {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SmtpGateway {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

/// HTML message from the credential's username to the recipient.
pub(crate) fn build_message(
    server: &ServerCredential,
    message: &OutboundMessage,
) -> Result<Message, GatewayError> {
    let from: Mailbox = server
        .username
        .parse()
        .map_err(|e: lettre::address::AddressError| GatewayError::InvalidAddress {
            address: server.username.clone(),
            reason: e.to_string(),
        })?;
    let to: Mailbox = message
        .to
        .parse()
        .map_err(|e: lettre::address::AddressError| GatewayError::InvalidAddress {
            address: message.to.clone(),
            reason: e.to_string(),
        })?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(message.subject.as_str())
        .header(ContentType::TEXT_HTML)
        .body(message.html.clone())
        .map_err(|e| GatewayError::Message(e.to_string()))
}

#[async_trait]
impl DeliveryGateway for SmtpGateway {
    async fn send(
        &self,
        server: &ServerCredential,
        message: &OutboundMessage,
    ) -> Result<(), GatewayError> {
        let email = build_message(server, message)?;

        // SSL = 接続時から TLS、TLS = STARTTLS で昇格
        let transport = match server.security {
            TransportSecurity::Ssl => AsyncSmtpTransport::<Tokio1Executor>::relay(&server.host),
            TransportSecurity::Tls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&server.host)
            }
        }
        .map_err(|e| GatewayError::Transport(format!("failed to create SMTP transport: {e}")))?;

        let mailer = transport
            .port(server.port)
            .credentials(Credentials::new(
                server.username.clone(),
                server.secret.clone(),
            ))
            .timeout(Some(self.timeout))
            .build();

        let response = mailer
            .send(email)
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        debug!(server = %server.name, code = %response.code(), "smtp accepted message");
        Ok(())
    }
}

//! DeliveryGateway port - 1 通送信の抽象化
//!
//! # 実装
//! - **SmtpGateway**: lettre による SMTP 送信（本番用）
//! - **DryRunGateway**: 送信せずに記録する（開発・テスト用）

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{OutboundMessage, ServerCredential};

/// Why a send failed. The queue does not distinguish retryable from fatal
/// failures; every variant goes through the same retry policy.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Message(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// DeliveryGateway は 1 つの credential で 1 通を送る
///
/// # 設計原則
/// - 呼び出しごとにセッションを作る（接続プールなし）
/// - 内部でリトライしない（1 呼び出し = 1 送信試行）
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    async fn send(
        &self,
        server: &ServerCredential,
        message: &OutboundMessage,
    ) -> Result<(), GatewayError>;
}

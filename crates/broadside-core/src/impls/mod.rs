//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryCampaignStore**: 開発・テスト用の campaign 正本
//! - **InMemoryLedger**: 開発・テスト用の配送履歴
//! - **SmtpGateway**: lettre による SMTP 送信
//! - **DryRunGateway**: 送信しない gateway（デモ・テスト用）
//!
//! # 本番用実装
//! DB バックエンドの store / ledger は別クレートに置く想定。

pub mod dry_run;
pub mod memory_ledger;
pub mod memory_store;
pub mod smtp;

// 主要な型を再エクスポート
pub use self::dry_run::{DryRunGateway, SentMessage};
pub use self::memory_ledger::InMemoryLedger;
pub use self::memory_store::InMemoryCampaignStore;
pub use self::smtp::SmtpGateway;

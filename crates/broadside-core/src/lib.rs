//! broadside-core
//!
//! Campaign dispatch engine: campaign ごとに専用 queue を作り、
//! 受信者 1 人 = 1 ジョブで配送・リトライ・完了検知を行う。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, campaign, server, recipient, job, ledger）
//! - **ports**: 抽象化レイヤー（CampaignStore, DeliveryGateway, DeliveryLedger, Clock, IdGenerator）
//! - **queue**: campaign queue（JobQueue trait + in-memory 実装、retry policy）
//! - **app**: アプリケーションロジック（registry, active queues, worker, schedule loop, builder）
//! - **impls**: 実装（in-memory store / ledger、SMTP / dry-run gateway）
//! - **config**: TOML 設定
//! - **observability**: queue counts、status view、tracing 初期化
//! - **error**: registry コマンドのエラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{
    CampaignRegistry, DueStarts, RegistryBuilder, ScheduleFailure, ScheduleLoop, StartReport,
};
pub use config::EngineConfig;
pub use error::EngineError;
pub use observability::{CampaignSnapshot, QueueCounts};

//! App - アプリケーション層
//!
//! このモジュールは、ports と queue を組み合わせて campaign の配送を駆動します。
//!
//! # 主要コンポーネント
//! - **RegistryBuilder**: registry の構築とワイヤリング
//! - **CampaignRegistry**: Start / Pause / Resume / Terminate / Schedule / Delete
//! - **ActiveQueues**: campaign ごとの queue + worker group の表
//! - **WorkerGroup**: lease → ledger → gateway → complete/fail のループ
//! - **ScheduleLoop**: 予約 campaign の起動

pub mod active_queues;
pub mod builder;
pub mod registry;
pub mod schedule_loop;
pub mod worker;

// 主要な型を再エクスポート
pub use self::active_queues::ActiveQueues;
pub use self::builder::{BuildError, RegistryBuilder};
pub use self::registry::{CampaignRegistry, DueStarts, StartReport};
pub use self::schedule_loop::{ScheduleFailure, ScheduleLoop};
pub use self::worker::WorkerGroup;

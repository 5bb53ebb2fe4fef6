//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! engine が外部（campaign の正本、SMTP、ledger の永続化、時刻）に
//! 触れるのはすべてここの trait 経由です。

pub mod campaign_store;
pub mod clock;
pub mod gateway;
pub mod id_generator;
pub mod ledger;

pub use self::campaign_store::{CampaignStore, StoreError};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::gateway::{DeliveryGateway, GatewayError};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::ledger::{DeliveryLedger, LedgerError};

//! Domain identifiers (strongly-typed IDs).
//!
//! ULID ベースの ID を Phantom type パターンで型付けしています。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: 生成順序でソートできる（ledger の挿入順と一致する）
//! - **分散生成可能**: 調整なしで生成できる
//!
//! `Id<T>` の `T` は実行時には使わないマーカー型で、
//! `CampaignId` と `ServerId` のような取り違えをコンパイル時に防ぎます。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"campaign-", "smtp-" など）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// JSON 上は ULID 文字列そのもの（プレフィックスなし）として表現されます。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Fresh id from the system clock. Prefer an `IdGenerator` where a clock is injected.
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Accepts both the prefixed display form and a bare ULID.
impl<T: IdMarker> FromStr for Id<T> {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw).map(Self::from_ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

macro_rules! id_marker {
    ($(#[$doc:meta])* $marker:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $marker {}

        impl IdMarker for $marker {
            fn prefix() -> &'static str {
                $prefix
            }
        }
    };
}

id_marker!(
    /// Campaign のマーカー型
    Campaign,
    "campaign-"
);
id_marker!(
    /// Outbound server credential のマーカー型
    Server,
    "smtp-"
);
id_marker!(
    /// Subscriber のマーカー型
    Subscriber,
    "sub-"
);
id_marker!(
    /// Subscriber list のマーカー型
    SubscriberList,
    "list-"
);
id_marker!(
    /// Template のマーカー型
    Template,
    "tpl-"
);
id_marker!(
    /// Owner (user) のマーカー型
    Owner,
    "user-"
);
id_marker!(
    /// Delivery job のマーカー型
    Job,
    "job-"
);
id_marker!(
    /// Ledger entry のマーカー型
    LedgerEntry,
    "log-"
);

/// Identifier of a campaign (start/pause/resume/terminate unit).
pub type CampaignId = Id<Campaign>;

/// Identifier of an outbound server credential.
pub type ServerId = Id<Server>;

/// Identifier of a subscriber (recipient).
pub type SubscriberId = Id<Subscriber>;

pub type ListId = Id<SubscriberList>;

pub type TemplateId = Id<Template>;

pub type OwnerId = Id<Owner>;

/// Identifier of one queued delivery job (one recipient of one campaign).
pub type JobId = Id<Job>;

/// Identifier of one delivery ledger row (one attempt).
pub type LedgerEntryId = Id<LedgerEntry>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid = Ulid::new();

        let campaign = CampaignId::from_ulid(ulid);
        let server = ServerId::from_ulid(ulid);
        let entry = LedgerEntryId::from_ulid(ulid);

        assert_eq!(campaign.as_ulid(), server.as_ulid());
        assert!(campaign.to_string().starts_with("campaign-"));
        assert!(server.to_string().starts_with("smtp-"));
        assert!(entry.to_string().starts_with("log-"));
        // let _: CampaignId = server; // <- does not compile
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = LedgerEntryId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = LedgerEntryId::generate();

        assert!(id1 < id2);
    }

    #[test]
    fn serializes_as_bare_ulid() {
        let ulid = Ulid::new();
        let id = CampaignId::from_ulid(ulid);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{ulid}\""));

        let back: CampaignId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn parses_prefixed_and_bare_forms() {
        let id = CampaignId::generate();

        let prefixed: CampaignId = id.to_string().parse().unwrap();
        let bare: CampaignId = id.as_ulid().to_string().parse().unwrap();

        assert_eq!(prefixed, id);
        assert_eq!(bare, id);
        assert!("campaign-not-a-ulid".parse::<CampaignId>().is_err());
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;

        assert_eq!(size_of::<CampaignId>(), size_of::<Ulid>());
        assert_eq!(size_of::<JobId>(), 16);
    }
}

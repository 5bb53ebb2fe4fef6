use serde::{Deserialize, Serialize};

use super::ids::{ListId, SubscriberId};

/// A subscriber, as the engine sees it (read-only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: SubscriberId,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    /// The one subscriber list this recipient belongs to.
    pub list: ListId,
}

impl Recipient {
    pub fn new(id: SubscriberId, email: impl Into<String>, list: ListId) -> Self {
        Self {
            id,
            email: email.into(),
            name: None,
            list,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

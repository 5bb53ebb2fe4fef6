//! Outbound server credentials.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{OwnerId, ServerId};

/// How the session to the outbound server is secured.
///
/// - `Ssl`: implicit TLS from the first byte (usually port 465).
/// - `Tls`: plain connect, then STARTTLS (usually port 587).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportSecurity {
    Tls,
    Ssl,
}

/// One outbound server the campaign can rotate through.
///
/// `username` doubles as the sender address.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCredential {
    pub id: ServerId,
    /// Display name; this is what the delivery ledger records.
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
    pub security: TransportSecurity,
    pub owner: OwnerId,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

// secret はログに出さない
impl fmt::Debug for ServerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCredential")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("secret", &"***")
            .field("security", &self.security)
            .field("owner", &self.owner)
            .field("active", &self.active)
            .finish()
    }
}

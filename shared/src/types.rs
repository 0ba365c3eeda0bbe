use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::protocol::{DEFAULT_CACHE_CONTROL, DEFAULT_SERVER_ID};

/// Whether a registration belongs to this process or was observed elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Manifestation {
    Local,
    Remote,
}

/// One advertised service, keyed by its USN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    /// Unique Service Name, e.g. "uuid:...::upnp:rootdevice"
    pub usn: String,

    /// Search target this registration answers to
    pub service_type: String,

    /// URL of the device descriptor
    pub location: String,

    /// SERVER banner
    pub server: String,

    /// CACHE-CONTROL directive, e.g. "max-age=1800"
    pub cache_control: String,

    pub manifestation: Manifestation,

    /// Suppresses announcements and wildcard-search answers
    pub silent: bool,

    /// Replaces the HOST header of NOTIFY frames when set
    pub host: Option<String>,

    /// Time of the last (re)registration
    pub last_seen: DateTime<Utc>,
}

impl ServiceRegistration {
    /// A local, non-silent registration with the default banner and max-age
    pub fn local(usn: impl Into<String>, service_type: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            usn: usn.into(),
            service_type: service_type.into(),
            location: location.into(),
            server: DEFAULT_SERVER_ID.to_string(),
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
            manifestation: Manifestation::Local,
            silent: false,
            host: None,
            last_seen: Utc::now(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.manifestation == Manifestation::Local
    }
}

/// A callback endpoint holding a lease on status notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub callback_url: String,
    pub expires_at: DateTime<Utc>,
}

impl Subscriber {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

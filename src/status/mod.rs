//! Shared egress status
//!
//! One [`StatusStore`] exists per process. The refresh loop is its only
//! writer; request handlers only ever get cloned snapshots, so a reader
//! sees either the record before a refresh or the one after it, never a mix.

pub mod refresh;

pub use refresh::RefreshLoop;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use tracing::debug;

/// Snapshot of the agent's egress status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRecord {
    /// Whether the most recent self-check succeeded
    #[serde(rename = "status")]
    pub online: bool,

    /// Static identification label from configuration
    pub isp: String,

    /// Last successfully observed public IP, kept when later checks fail
    #[serde(rename = "ipAddress")]
    pub public_ip: String,

    /// Time of the last attempted refresh, successful or not
    #[serde(rename = "lastCheck", serialize_with = "serialize_last_check")]
    pub last_checked_at: Option<DateTime<Utc>>,

    /// Configured forward proxy, empty for direct
    #[serde(skip)]
    pub proxy_endpoint: String,
}

/// `lastCheck` before any refresh attempt; keeps the field an RFC3339 string
pub const NEVER_CHECKED: &str = "0001-01-01T00:00:00Z";

fn serialize_last_check<S: Serializer>(
    at: &Option<DateTime<Utc>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match at {
        Some(at) => at.serialize(serializer),
        None => serializer.serialize_str(NEVER_CHECKED),
    }
}

impl StatusRecord {
    fn initial(isp: String, proxy_endpoint: String) -> Self {
        StatusRecord {
            online: false,
            isp,
            public_ip: String::new(),
            last_checked_at: None,
            proxy_endpoint,
        }
    }
}

/// Process-wide status holder
#[derive(Debug)]
pub struct StatusStore {
    record: RwLock<StatusRecord>,
}

impl StatusStore {
    /// Create the store in its pre-check state
    pub fn new(isp: impl Into<String>, proxy_endpoint: impl Into<String>) -> Self {
        StatusStore {
            record: RwLock::new(StatusRecord::initial(isp.into(), proxy_endpoint.into())),
        }
    }

    /// Copy of the current record
    pub fn read(&self) -> StatusRecord {
        self.record.read().clone()
    }

    /// Record the outcome of a refresh attempt
    ///
    /// `ip` is only applied when `online` is true; a failed refresh keeps the
    /// last known good address and only moves `last_checked_at`.
    pub fn publish_refresh(&self, online: bool, ip: Option<String>, at: DateTime<Utc>) {
        let mut record = self.record.write();
        record.online = online;
        record.last_checked_at = Some(at);
        if online {
            if let Some(ip) = ip {
                record.public_ip = ip;
            }
        }
        debug!(
            "Status refreshed: online={} ip={} at={}",
            record.online, record.public_ip, at
        );
    }
}

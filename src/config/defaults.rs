//! Built-in settings (layer 1)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Where owner documents live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Directory holding one `<owner>.json` per owner
    pub dir: PathBuf,
}

/// Owner lock acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockSettings {
    /// Give up waiting for an owner lock after this long
    pub timeout_ms: u64,

    /// Warn about contention after this long
    pub warn_after_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` takes precedence
    pub filter: String,
}

/// Typed view of the merged settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub store: StoreSettings,
    pub lock: LockSettings,
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store: StoreSettings {
                dir: PathBuf::from(".studio-routing/route-sets"),
            },
            lock: LockSettings {
                timeout_ms: 10_000,
                warn_after_ms: 500,
            },
            log: LogSettings {
                filter: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// JSON form used as the bottom merge layer
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "store": { "dir": self.store.dir },
            "lock": {
                "timeout_ms": self.lock.timeout_ms,
                "warn_after_ms": self.lock.warn_after_ms
            },
            "log": { "filter": self.log.filter }
        })
    }
}

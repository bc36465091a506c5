use serde::Deserialize;
use tracing::Level;

/// Top-level configuration settings for the application.
///
/// Aggregates everything needed to run the skillbus service: the unix
/// socket it listens on, where the local storage database lives, and the
/// log level.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Configuration for the service itself, such as its socket paths.
    pub service: ServiceSettings,
    /// Configuration for the local storage backend.
    pub storage: StorageSettings,
    /// Logging configuration.
    pub log: LogSettings,
}

/// Configuration settings for the service.
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceSettings {
    /// Filesystem path of the unix-domain socket the broker listens on.
    pub socket_path: String,
    /// Optional message-broker socket path, passed through to peers that
    /// ask for it; the broker itself does not consume it.
    pub lmb_socket_path: Option<String>,
}

/// Configuration settings for local storage.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Directory of the embedded key-value database holding the
    /// subscription list.
    pub path: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    /// Maximum log level: error, warn, info, debug or trace.
    pub level: String,
}

impl LogSettings {
    /// The configured level as a validated [`Level`]. Unrecognized values
    /// fall back to `info` so a typo in the config never silences the
    /// service entirely.
    pub fn max_level(&self) -> Level {
        self.level.parse().unwrap_or(Level::INFO)
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub service: Option<PartialServiceSettings>,
    pub storage: Option<PartialStorageSettings>,
    pub log: Option<PartialLogSettings>,
}

/// Partial service settings.
#[derive(Debug, Deserialize)]
pub struct PartialServiceSettings {
    pub socket_path: Option<String>,
    pub lmb_socket_path: Option<String>,
}

/// Partial storage settings.
#[derive(Debug, Deserialize)]
pub struct PartialStorageSettings {
    pub path: Option<String>,
}

/// Partial logging settings.
#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            service: ServiceSettings {
                socket_path: "/tmp/skillbus.sock".to_string(),
                lmb_socket_path: None,
            },
            storage: StorageSettings {
                path: "skillbus_db".to_string(),
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

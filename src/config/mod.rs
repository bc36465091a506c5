//! The `config` module handles the application's configuration management.
//!
//! It defines the structure of the application settings, provides default
//! values, implements loading from configuration files and environment
//! variables, and builds the service-configuration document the broker
//! consumes.
//!
//! This module uses the `config` crate for flexible and layered configuration.

pub mod settings;

use config::{Config, ConfigError, Environment, File};
use serde_json::{json, Map, Value};

use crate::config::settings::PartialSettings;

pub use settings::Settings;
pub use settings::{LogSettings, ServiceSettings, StorageSettings};

/// Loads application settings from file, environment, and defaults.
///
/// This function reads configuration values from:
/// 1. An optional `config/default` file (TOML/YAML/JSON).
/// 2. Environment variables with `_` separators (e.g., `SERVICE_SOCKETPATH`).
///
/// Missing fields are filled using default values defined in `Settings::default()`.
///
/// # Errors
///
/// Returns an error if the config file cannot be parsed or deserialized.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::default().separator("_"));

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    let default = Settings::default();

    Ok(Settings {
        service: ServiceSettings {
            socket_path: partial
                .service
                .as_ref()
                .and_then(|s| s.socket_path.clone())
                .unwrap_or(default.service.socket_path),
            lmb_socket_path: partial
                .service
                .as_ref()
                .and_then(|s| s.lmb_socket_path.clone())
                .or(default.service.lmb_socket_path),
        },
        storage: StorageSettings {
            path: partial
                .storage
                .as_ref()
                .and_then(|s| s.path.clone())
                .unwrap_or(default.storage.path),
        },
        log: LogSettings {
            level: partial
                .log
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.log.level),
        },
    })
}

/// Build the configuration document `Broker::configure` consumes.
///
/// The broker reads its section from the `aace.localSkillService` key;
/// `lmbSocketPath` is included only when set.
pub fn local_service_config(lss_socket_path: &str, lmb_socket_path: Option<&str>) -> Value {
    let mut section = json!({ "lssSocketPath": lss_socket_path });
    if let Some(lmb) = lmb_socket_path {
        section["lmbSocketPath"] = Value::String(lmb.to_string());
    }
    let mut document = Map::new();
    document.insert("aace.localSkillService".to_string(), section);
    Value::Object(document)
}

// src/config/mod.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;

use crate::capture::permission::PermissionState;

pub mod credential;

pub use credential::{ConfigError, Credential};

pub const DEFAULT_CONFIG_FILE: &str = "GenerativeAI-Info.toml";
pub const CONFIG_ENV_VAR: &str = "RECEIPTSNAP_CONFIG";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Everything read from the configuration file at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub credential: Credential,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub camera_access: PermissionState,
}

impl Settings {
    /// Load and validate the configuration file. Any error here means the
    /// build is misconfigured and the caller should not start the UI.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let table = credential::read_table(path)?;
        let credential = credential::credential_from_table(&table, path)?;

        let model = optional_str(&table, "MODEL")?.unwrap_or(DEFAULT_MODEL).to_string();
        let base_url = optional_str(&table, "BASE_URL")?
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        let timeout_secs = match table.get("TIMEOUT_SECS") {
            None => DEFAULT_TIMEOUT_SECS,
            Some(value) => value
                .as_integer()
                .filter(|secs| *secs > 0)
                .map(|secs| secs as u64)
                .ok_or_else(|| ConfigError::InvalidSetting {
                    key: "TIMEOUT_SECS",
                    reason: format!("expected a positive integer, got {}", value),
                })?,
        };

        let camera_access = optional_str(&table, "CAMERA_ACCESS")?
            .map(PermissionState::parse)
            .unwrap_or(PermissionState::NotDetermined);

        info!("Using model {} at {}", model, base_url);

        Ok(Self {
            credential,
            model,
            base_url,
            timeout: Duration::from_secs(timeout_secs),
            camera_access,
        })
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model {
            self.model = model;
        }
        self
    }
}

fn optional_str<'a>(table: &'a toml::Table, key: &'static str) -> Result<Option<&'a str>, ConfigError> {
    match table.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidSetting {
                key,
                reason: format!("expected a string, got {}", value.type_str()),
            }),
    }
}

/// Pick the config path: the `--config` flag (or [`CONFIG_ENV_VAR`], read by
/// clap), else the default file in the working directory.
pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

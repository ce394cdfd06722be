// src/config/credential.rs
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

/// Field holding the API key in the configuration file.
pub const API_KEY_FIELD: &str = "API_KEY";

/// Values starting with this marker are template placeholders, not keys.
pub const PLACEHOLDER_MARKER: char = '_';

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't find file '{}' containing the API key", .0.display())]
    Missing(PathBuf),

    #[error("failed to read '{}': {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("'{}' is not valid TOML: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("couldn't find key '{key}' in '{}'", .path.display())]
    MissingKey { key: &'static str, path: PathBuf },

    #[error("API_KEY not valid: {0}")]
    Invalid(&'static str),

    #[error("invalid value for '{key}': {reason}")]
    InvalidSetting { key: &'static str, reason: String },
}

/// API key for the hosted model. Loaded once, never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        if value.is_empty() {
            return Err(ConfigError::Invalid("value is empty"));
        }
        if value.starts_with(PLACEHOLDER_MARKER) {
            return Err(ConfigError::Invalid("value is still a placeholder"));
        }
        Ok(Self(value.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Read the key/value file at `path` and return its parsed table.
pub(crate) fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::Missing(path.to_path_buf())
        } else {
            ConfigError::Unreadable { path: path.to_path_buf(), source }
        }
    })?;

    raw.parse::<toml::Table>().map_err(|source| ConfigError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn credential_from_table(table: &toml::Table, path: &Path) -> Result<Credential, ConfigError> {
    let value = table
        .get(API_KEY_FIELD)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ConfigError::MissingKey {
            key: API_KEY_FIELD,
            path: path.to_path_buf(),
        })?;

    Credential::parse(value)
}

/// Load the API key from the configuration file at `path`.
pub fn load(path: &Path) -> Result<Credential, ConfigError> {
    let table = read_table(path)?;
    let credential = credential_from_table(&table, path)?;
    info!("Loaded API key from {}", path.display());
    Ok(credential)
}

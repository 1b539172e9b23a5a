//! Configuration for ipmail
//!
//! Defaults, then an optional TOML file, then `IPMAIL_*` environment
//! overrides. Every constructor validates before returning.

use crate::announcement::MAIL_TOPIC;
use crate::dispatcher::DispatchMode;
use crate::logging::{LogConfig, LogLevel};
use crate::mailbox::MailboxPaths;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod error;

pub use error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,

    pub dispatch: DispatchConfig,

    pub logging: LoggingConfig,
}

/// Where identities, contacts and mailboxes live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,

    pub identity: String,

    pub contacts: String,

    pub inbox: String,

    pub sent: String,

    pub requests: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Handle announcements concurrently instead of in delivery order
    pub concurrent: bool,

    pub topic: String,

    /// Capacity of the inbound subscription channel
    pub subscription_buffer: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,

    pub json_format: bool,

    pub with_timestamp: bool,

    pub with_target: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./ipmail-data"),
            identity: "identity".to_string(),
            contacts: "contacts".to_string(),
            inbox: "messages".to_string(),
            sent: "sent".to_string(),
            requests: "requests".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join(&self.identity)
    }

    pub fn contacts_path(&self) -> PathBuf {
        self.data_dir.join(&self.contacts)
    }

    /// Mailbox files under `data_dir`
    pub fn paths(&self) -> MailboxPaths {
        MailboxPaths {
            sent: self.data_dir.join(&self.sent),
            inbox: self.data_dir.join(&self.inbox),
            requests: self.data_dir.join(&self.requests),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { concurrent: true, topic: MAIL_TOPIC.to_string(), subscription_buffer: 256 }
    }
}

impl DispatchConfig {
    pub fn mode(&self) -> DispatchMode {
        if self.concurrent {
            DispatchMode::Concurrent
        } else {
            DispatchMode::Sequential
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json_format: false, with_timestamp: true, with_target: true }
    }
}

impl LoggingConfig {
    pub fn to_log_config(&self) -> Result<LogConfig, ConfigError> {
        let level = LogLevel::from_str(&self.level).map_err(|e| ConfigError::InvalidValue {
            key: "logging.level",
            message: e.to_string(),
        })?;
        Ok(LogConfig::new(level)
            .with_timestamp(self.with_timestamp)
            .with_target(self.with_target)
            .json_format(self.json_format))
    }
}

fn parse_env<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue { key, message: e.to_string() }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Override fields from `IPMAIL_*` environment variables
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(data_dir) = parse_env::<PathBuf>("IPMAIL_STORAGE_DATA_DIR")? {
            self.storage.data_dir = data_dir;
        }
        if let Some(concurrent) = parse_env("IPMAIL_DISPATCH_CONCURRENT")? {
            self.dispatch.concurrent = concurrent;
        }
        if let Some(topic) = parse_env("IPMAIL_DISPATCH_TOPIC")? {
            self.dispatch.topic = topic;
        }
        if let Some(level) = parse_env("IPMAIL_LOG_LEVEL")? {
            self.logging.level = level;
        }
        if let Some(json) = parse_env("IPMAIL_LOG_JSON")? {
            self.logging.json_format = json;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let storage = &self.storage;
        let files = [
            ("identity", &storage.identity),
            ("contacts", &storage.contacts),
            ("inbox", &storage.inbox),
            ("sent", &storage.sent),
            ("requests", &storage.requests),
        ];
        if let Some((name, _)) = files.iter().find(|(_, file)| file.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("storage.{} must not be empty", name)));
        }
        for (i, (name, file)) in files.iter().enumerate() {
            if let Some((other, _)) = files[i + 1..].iter().find(|(_, f)| f == file) {
                return Err(ConfigError::Invalid(format!(
                    "storage.{} and storage.{} point at the same file",
                    name, other
                )));
            }
        }

        if self.dispatch.topic.is_empty() {
            return Err(ConfigError::Invalid("dispatch.topic must not be empty".to_string()));
        }
        if self.dispatch.subscription_buffer == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.subscription_buffer must be greater than 0".to_string(),
            ));
        }

        if LogLevel::from_str(&self.logging.level).is_err() {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

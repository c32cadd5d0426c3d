//! Service configuration
//!
//! Loaded from an optional file (`API_CONFIG_FILE`, default `config/api`)
//! with `API__` environment overrides, e.g. `API__VERIFICATION__LIFE_SECONDS=600`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;

const CONFIG_FILE_VAR: &str = "API_CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "config/api";

/// Where users, groups and todos are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

/// How outgoing email leaves the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
    /// SMTP relay configured through `SMTP_*` variables
    #[default]
    Smtp,
    /// Log messages instead of sending them
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// When disabled accounts are confirmed at registration
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_code_length")]
    pub code_length: usize,
    #[serde(default = "default_life_seconds")]
    pub life_seconds: i64,
    /// From address of every outgoing email
    #[serde(default = "default_sender")]
    pub sender: String,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            code_length: default_code_length(),
            life_seconds: default_life_seconds(),
            sender: default_sender(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between two sweeps
    #[serde(default = "default_day")]
    pub interval_secs: u64,
    /// Look-ahead horizon for due todos
    #[serde(default = "default_day_i64")]
    pub window_secs: i64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_day(),
            window_secs: default_day_i64(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Upper bound for a decoded image or file attachment
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_attachment_bytes: default_max_attachment_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub storage: StorageBackend,
    #[serde(default)]
    pub mail_transport: MailTransport,
    /// How long in-flight requests may run after a shutdown signal
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Marks the `auth` cookie `Secure`
    #[serde(default)]
    pub cookie_secure: bool,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            storage: StorageBackend::default(),
            mail_transport: MailTransport::default(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            cookie_secure: false,
            verification: VerificationConfig::default(),
            notifications: NotificationConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load the configuration from the default file location and environment
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var(CONFIG_FILE_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    /// Load the configuration from `path` (any format `config` understands,
    /// extension optional, file optional) with `API__` overrides on top
    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("API")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to build config from: {}", path))?
            .try_deserialize()
            .with_context(|| format!("Failed to deserialize config from: {}", path))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.verification.code_length == 0 {
            anyhow::bail!("verification.code_length must be at least 1");
        }
        if self.verification.life_seconds <= 0 {
            anyhow::bail!("verification.life_seconds must be positive");
        }
        if self.notifications.interval_secs == 0 {
            anyhow::bail!("notifications.interval_secs must be positive");
        }
        if self.notifications.window_secs < 0 {
            anyhow::bail!("notifications.window_secs must not be negative");
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_code_length() -> usize {
    8
}
fn default_life_seconds() -> i64 {
    3600
}
fn default_sender() -> String {
    "noreply@localhost".to_string()
}
fn default_day() -> u64 {
    86_400
}
fn default_day_i64() -> i64 {
    86_400
}
fn default_max_attachment_bytes() -> usize {
    5 * 1024 * 1024
}
fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}
fn default_shutdown_grace_secs() -> u64 {
    10
}

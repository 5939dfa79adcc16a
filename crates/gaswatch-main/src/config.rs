// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of GasWatch.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Application configuration.
//!
//! Loaded from `--config <path>`, else `gaswatch.toml`, else `config.json`,
//! else defaults; `GASWATCH_*` environment variables override the file.

use anyhow::{Context, Result};
use gaswatch_core::{BillingRates, ModelConfig, Schedule, storage::DEFAULT_HISTORY_PATH};
use gaswatch_portal::{IndicatorTable, PortalConfig};
use gaswatch_types::Credentials;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::info;

const DEFAULT_TOML_PATH: &str = "gaswatch.toml";
const DEFAULT_JSON_PATH: &str = "config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub portal: PortalConfig,

    /// Extra wording appended to the built-in login/error indicators
    #[serde(default)]
    pub indicators: IndicatorOverrides,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub billing: BillingRates,

    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorOverrides {
    pub login_url_markers: Vec<String>,
    pub error_url_markers: Vec<String>,
    pub login_phrases: Vec<String>,
    pub session_phrases: Vec<String>,
    pub portal_error_phrases: Vec<String>,
    pub scan_limit: Option<usize>,
}

impl IndicatorOverrides {
    /// Built-in indicators plus the configured additions.
    pub fn table(&self) -> IndicatorTable {
        let mut table = IndicatorTable::default();
        table.extend(&IndicatorTable {
            login_url_markers: self.login_url_markers.clone(),
            error_url_markers: self.error_url_markers.clone(),
            login_phrases: self.login_phrases.clone(),
            session_phrases: self.session_phrases.clone(),
            portal_error_phrases: self.portal_error_phrases.clone(),
            scan_limit: 0,
        });
        if let Some(limit) = self.scan_limit {
            table.scan_limit = limit;
        }
        table
    }
}

fn default_run_at() -> String {
    gaswatch_core::scheduling::DEFAULT_RUN_AT.to_owned()
}

fn default_timezone() -> String {
    gaswatch_core::scheduling::DEFAULT_TIMEZONE.to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Local time of the daily cycle (HH:MM)
    #[serde(default = "default_run_at")]
    pub run_at: String,

    /// IANA timezone of `run_at`
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            run_at: default_run_at(),
            timezone: default_timezone(),
        }
    }
}

impl ScheduleConfig {
    pub fn resolve(&self) -> Result<Schedule> {
        Schedule::parse(&self.run_at, &self.timezone).context("Invalid schedule configuration")
    }
}

fn default_history_path() -> String {
    DEFAULT_HISTORY_PATH.to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding the usage history
    #[serde(default = "default_history_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load, apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::discover()?,
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
        }
    }

    fn discover() -> Result<Self> {
        if let Ok(config_str) = std::fs::read_to_string(DEFAULT_TOML_PATH) {
            let config: AppConfig =
                toml::from_str(&config_str).context("Failed to parse gaswatch.toml")?;
            info!("✅ Loaded configuration from gaswatch.toml");
            return Ok(config);
        }

        if let Ok(config_str) = std::fs::read_to_string(DEFAULT_JSON_PATH) {
            let config: AppConfig =
                serde_json::from_str(&config_str).context("Failed to parse config.json")?;
            info!("✅ Loaded configuration from config.json");
            return Ok(config);
        }

        info!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Apply `GASWATCH_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(username) = lookup("GASWATCH_USERNAME") {
            self.account.username = username;
        }
        if let Some(password) = lookup("GASWATCH_PASSWORD") {
            self.account.password = password;
        }
        if let Some(url) = lookup("GASWATCH_BASE_URL") {
            self.portal.base_url = url;
        }
        if let Some(path) = lookup("GASWATCH_STORAGE_PATH") {
            self.storage.path = path;
        }
    }

    /// Checks everything except credentials, which only the portal commands
    /// need.
    pub fn validate(&self) -> Result<()> {
        self.portal.validate()?;
        self.schedule.resolve()?;

        if self.storage.path.trim().is_empty() {
            anyhow::bail!("storage.path cannot be empty");
        }

        let model = &self.model;
        if model.min_points < 2 {
            anyhow::bail!("model.min_points must be at least 2, got {}", model.min_points);
        }
        if model.grid_min >= model.grid_max {
            anyhow::bail!(
                "model.grid_min ({}) must be below model.grid_max ({})",
                model.grid_min,
                model.grid_max
            );
        }
        if model.grid_step.is_nan() || model.grid_step <= 0.0 {
            anyhow::bail!("model.grid_step must be positive");
        }
        if model.retention_days <= 0 {
            anyhow::bail!("model.retention_days must be positive");
        }

        let billing = &self.billing;
        if billing.usage_rate <= 0.0 {
            anyhow::bail!("billing.usage_rate must be positive, got {}", billing.usage_rate);
        }
        if billing.fixed_cost < 0.0 {
            anyhow::bail!("billing.fixed_cost cannot be negative");
        }
        if billing.tax_percent < 0.0 {
            anyhow::bail!("billing.tax_percent cannot be negative");
        }

        Ok(())
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let credentials = Credentials::new(&self.account.username, &self.account.password);
        if !credentials.is_complete() {
            anyhow::bail!(
                "Portal credentials missing: set account.username/account.password or GASWATCH_USERNAME/GASWATCH_PASSWORD"
            );
        }
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.schedule.run_at, "07:00");
        assert_eq!(config.schedule.timezone, "America/Chicago");
        assert_eq!(config.portal.min_request_interval_secs, 180);
        assert_eq!(config.model.retention_days, 90);
        assert_eq!(config.billing.fixed_cost, 25.03);
        assert_eq!(config.system.log_level, "info");
        assert!(config.validate().is_ok());
        assert!(config.credentials().is_err());
    }

    #[test]
    fn test_toml_sections() {
        let config: AppConfig = toml::from_str(
            r#"
            [account]
            username = "jane@example.com"
            password = "hunter2"

            [portal]
            min_request_interval_secs = 240

            [schedule]
            run_at = "06:30"
            timezone = "America/Denver"

            [billing]
            usage_rate = 1.95

            [indicators]
            session_phrases = ["Please sign in again"]
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.portal.min_request_interval_secs, 240);
        assert_eq!(config.billing.usage_rate, 1.95);
        assert_eq!(config.billing.tax_percent, 8.0);
        assert_eq!(config.credentials().unwrap().username(), "jane@example.com");

        let table = config.indicators.table();
        assert!(table.session_phrases.contains(&"please sign in again".to_owned()));
        assert!(table.session_phrases.contains(&"access denied".to_owned()));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GASWATCH_USERNAME", "env-user"),
            ("GASWATCH_PASSWORD", "env-pass"),
            ("GASWATCH_STORAGE_PATH", "/tmp/gaswatch.json"),
        ]);
        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| (*v).to_owned()));

        assert_eq!(config.account.username, "env-user");
        assert_eq!(config.storage.path, "/tmp/gaswatch.json");
        assert_eq!(config.portal.base_url, gaswatch_portal::DEFAULT_BASE_URL);
        assert!(config.credentials().is_ok());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = AppConfig::default();
        config.schedule.run_at = "7 o'clock".to_owned();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.schedule.timezone = "Nowhere/Special".to_owned();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.billing.usage_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.model.grid_min = 80.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempdir().unwrap();

        let json_path = dir.path().join("gaswatch.json");
        std::fs::write(&json_path, r#"{"system": {"log_level": "debug"}}"#).unwrap();
        let config = AppConfig::from_file(&json_path).unwrap();
        assert_eq!(config.system.log_level, "debug");

        let toml_path = dir.path().join("gaswatch.toml");
        std::fs::write(&toml_path, "[storage]\npath = \"/var/lib/gaswatch/history.json\"\n")
            .unwrap();
        let config = AppConfig::from_file(&toml_path).unwrap();
        assert_eq!(config.storage.path, "/var/lib/gaswatch/history.json");

        assert!(AppConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_password_not_in_debug_output() {
        let config = AppConfig {
            account: AccountConfig {
                username: "jane".to_owned(),
                password: "hunter2".to_owned(),
            },
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}

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

//! Portal connection settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PortalError, Result};

pub const DEFAULT_BASE_URL: &str = "https://www.atmosenergy.com";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_owned()
}

fn default_60() -> u64 {
    60
}

fn default_180() -> u64 {
    180
}

fn default_3() -> u32 {
    3
}

fn default_1000() -> u64 {
    1000
}

/// Paths of the few portal pages the client touches.
///
/// The portal's layout is undocumented and changes without notice, so every
/// path is configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalEndpoints {
    pub login_page: String,
    pub authenticate: String,
    pub usage_landing: String,
    pub usage_page: String,
    pub usage_download: String,
    pub billing_period: String,
}

impl Default for PortalEndpoints {
    fn default() -> Self {
        Self {
            login_page: "/accountcenter/logon/login.html".to_owned(),
            authenticate: "/accountcenter/logon/authenticate.html".to_owned(),
            usage_landing: "/accountcenter/usagehistory/UsageHistoryLanding.html".to_owned(),
            usage_page: "/accountcenter/usagehistory/dailyUsage.html".to_owned(),
            usage_download: "/accountcenter/usagehistory/dailyUsageDownload.html".to_owned(),
            billing_period: "Current".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Scheme and host of the portal, without a trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub endpoints: PortalEndpoints,

    /// Browser user agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_60")]
    pub request_timeout_secs: u64,

    /// Minimum spacing between two outbound requests (seconds)
    #[serde(default = "default_180")]
    pub min_request_interval_secs: u64,

    /// Attempts per logical request, including the first
    #[serde(default = "default_3")]
    pub max_attempts: u32,

    /// First backoff delay; doubles after every failed attempt (milliseconds)
    #[serde(default = "default_1000")]
    pub backoff_base_ms: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            endpoints: PortalEndpoints::default(),
            user_agent: default_user_agent(),
            request_timeout_secs: 60,
            min_request_interval_secs: 180,
            max_attempts: 3,
            backoff_base_ms: 1000,
        }
    }
}

impl PortalConfig {
    /// Config pointed at another host, e.g. a mock server in tests.
    ///
    /// Spacing and backoff are zeroed so tests do not sleep.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            min_request_interval_secs: 0,
            backoff_base_ms: 0,
            ..Default::default()
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_secs(self.min_request_interval_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(PortalError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.max_attempts == 0 {
            return Err(PortalError::Config(
                "max_attempts must be at least 1".to_owned(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(PortalError::Config(
                "request_timeout_secs must be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PortalConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.min_request_interval(), Duration::from_secs(180));
        assert_eq!(config.backoff_base(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let config = PortalConfig::for_base_url("http://127.0.0.1:1234/");
        assert_eq!(
            config.url(&config.endpoints.login_page),
            "http://127.0.0.1:1234/accountcenter/logon/login.html"
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = PortalConfig {
            base_url: "ftp://example.com".to_owned(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PortalError::Config(_))));

        let config = PortalConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_endpoints_keep_defaults() {
        let config: PortalConfig = serde_json::from_str(
            r#"{"endpoints": {"usage_download": "/usage/export.xls"}}"#,
        )
        .unwrap();
        assert_eq!(config.endpoints.usage_download, "/usage/export.xls");
        assert_eq!(
            config.endpoints.login_page,
            PortalEndpoints::default().login_page
        );
        assert_eq!(config.min_request_interval_secs, 180);
    }
}

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

//! Error types for the portal crate

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortalError {
    /// Bad credentials, an ended session, or a login page where data was expected
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Transport failure after retries, a portal error page, or an unexpected status
    #[error("portal request failed{}: {message}", status_suffix(.status))]
    Api { status: Option<u16>, message: String },

    /// Payload format unrecognised or a required column is missing
    #[error("usage data could not be parsed: {0}")]
    DataParse(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// What the caller should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remediation {
    /// Prompt for new credentials; retrying with the same ones is pointless
    Reauthenticate,
    /// Transient; the next scheduled cycle may succeed
    RetryLater,
    /// The portal changed its download format
    ReportFormatChange,
    None,
}

impl PortalError {
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            status: None,
            message: message.into(),
        }
    }

    pub fn api_status(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Authentication(_) => Remediation::Reauthenticate,
            Self::Api { .. } => Remediation::RetryLater,
            Self::DataParse(_) => Remediation::ReportFormatChange,
            Self::Cancelled | Self::Config(_) => Remediation::None,
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

pub type Result<T> = std::result::Result<T, PortalError>;

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

//! Error types for the core crate

use gaswatch_portal::{PortalError, Remediation};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("history storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("history schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid run time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
}

/// Why an acquisition cycle did not complete.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Portal(#[from] PortalError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("an acquisition cycle is already in progress")]
    CycleInProgress,

    /// A panic or other unclassified failure caught at the cycle boundary
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl CycleError {
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Portal(e) => e.remediation(),
            Self::Storage(_) | Self::Unexpected(_) => Remediation::RetryLater,
            Self::CycleInProgress => Remediation::None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CycleError>;

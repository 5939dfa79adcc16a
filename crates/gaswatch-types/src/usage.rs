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

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dates::DATE_KEY_FORMAT;

/// Portal account credentials.
///
/// Immutable for the lifetime of a session; a new set of credentials means a
/// new client.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Username safe for log output (`abc***`).
    pub fn masked_username(&self) -> String {
        let visible: String = self.username.chars().take(3).collect();
        format!("{visible}***")
    }

    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.masked_username())
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One reporting day of gas consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub date: NaiveDate,

    /// Consumption for the day in the portal's volume unit (CCF)
    pub consumption: f64,

    /// Average outdoor temperature for the day (°F), when the portal reports it
    pub avg_temp: Option<f64>,
}

impl UsageRecord {
    pub fn new(date: NaiveDate, consumption: f64, avg_temp: Option<f64>) -> Self {
        Self {
            date,
            consumption,
            avg_temp,
        }
    }

    /// History uniqueness key (`YYYY-MM-DD`)
    pub fn date_key(&self) -> String {
        self.date.format(DATE_KEY_FORMAT).to_string()
    }

    /// Usable for model fitting: non-zero usage with a known temperature.
    pub fn is_usable(&self) -> bool {
        self.consumption > 0.0 && self.avg_temp.is_some_and(f64::is_finite)
    }
}

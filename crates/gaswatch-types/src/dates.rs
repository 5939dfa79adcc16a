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

//! Date-key handling.
//!
//! The portal is inconsistent about date formats, so every date that becomes a
//! history key goes through [`normalize_date_key`] first.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Canonical key format for a reporting day.
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%m-%d-%Y"];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Parse a date string in any of the formats seen in portal payloads or
/// older persisted histories.
pub fn parse_date_key(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Normalise a raw date string to `YYYY-MM-DD`.
///
/// Returns `None` when the string is not a recognisable date.
pub fn normalize_date_key(raw: &str) -> Option<String> {
    parse_date_key(raw).map(|date| date.format(DATE_KEY_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_and_us_formats() {
        assert_eq!(normalize_date_key("2026-01-30").as_deref(), Some("2026-01-30"));
        assert_eq!(normalize_date_key("01/30/2026").as_deref(), Some("2026-01-30"));
        assert_eq!(normalize_date_key(" 1/5/2026 ").as_deref(), Some("2026-01-05"));
    }

    #[test]
    fn test_datetime_formats_drop_time() {
        assert_eq!(
            normalize_date_key("2026-04-28 12:00:00").as_deref(),
            Some("2026-04-28")
        );
        assert_eq!(
            normalize_date_key("2026-04-28T23:30:00-05:00").as_deref(),
            Some("2026-04-28")
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse_date_key("").is_none());
        assert!(parse_date_key("Current").is_none());
        assert!(parse_date_key("13/45/2026").is_none());
    }
}

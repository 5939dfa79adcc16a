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

//! Usage download parser.
//!
//! The download endpoint claims to return an `.xls` file. In practice it
//! returns a legacy XLS, an XLSX, an HTML table with a spreadsheet content
//! type, or a login/error page. Both the spreadsheet and the HTML path are
//! reduced to a [`Table`] and summarised by the same code.

mod html;
mod spreadsheet;

use chrono::NaiveDate;
use gaswatch_types::{AccountSnapshot, UsageRecord, normalize_date_key, parse_date_key};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{PortalError, Result};
use crate::verify::{ResponseClassifier, looks_like_markup};

pub use html::extract_first_table;
pub(crate) use html::selector;
pub use spreadsheet::{decode_spreadsheet, table_from_range};

const CONSUMPTION_COLUMN: &str = "consumption";

/// One cell of a decoded table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

impl Cell {
    /// Numeric coercion; text like `"1,234.5"` is accepted.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) if value.is_finite() => Some(*value),
            Self::Text(text) => text
                .trim()
                .replace(',', "")
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite()),
            _ => None,
        }
    }

    /// Date value as a normalised string; unrecognised text is kept verbatim.
    pub fn as_date_string(&self) -> Option<String> {
        match self {
            Self::Date(date) => Some(date.format("%Y-%m-%d").to_string()),
            Self::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    None
                } else {
                    Some(normalize_date_key(text).unwrap_or_else(|| text.to_owned()))
                }
            }
            Self::Number(value) => Some(value.to_string()),
            Self::Empty => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(*date),
            Self::Text(text) => parse_date_key(text),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }
}

/// Header row plus data rows, independent of the source format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PayloadFormat {
    Html,
    Xlsx,
    Xls,
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Html => write!(f, "HTML table"),
            Self::Xlsx => write!(f, "XLSX workbook"),
            Self::Xls => write!(f, "XLS workbook"),
        }
    }
}

/// Normalised content of one usage download.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub format: PayloadFormat,

    /// Header names as found in the payload
    pub columns: Vec<String>,

    /// Rows with a recognisable date, one per reporting day
    pub records: Vec<UsageRecord>,

    /// Sum of every coercible consumption value
    pub total_usage: f64,

    /// Consumption of the last coercible row
    pub latest_usage: f64,

    pub period_start: Option<String>,
    pub period_end: Option<String>,

    /// Non-empty rows whose consumption could not be coerced
    pub rows_skipped: usize,
}

impl UsageReport {
    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            bill_date: self.period_end.clone(),
            billing_period_start: self.period_start.clone(),
            total_usage: self.total_usage,
            latest_daily_usage: self.latest_usage,
        }
    }
}

/// Strip the stray CR/LF and whitespace the portal sometimes wraps payloads in.
pub fn strip_noise(bytes: &[u8]) -> &[u8] {
    bytes.trim_ascii()
}

/// Hex dump of the first bytes of a payload, for diagnosing format changes.
pub fn byte_prefix(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take(64)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_header(header: &str) -> String {
    header.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    consumption: usize,
    date: Option<usize>,
    avg_temp: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &[String]) -> Result<Self> {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();

        let consumption = normalized
            .iter()
            .position(|h| h == CONSUMPTION_COLUMN)
            .ok_or_else(|| {
                PortalError::DataParse(format!(
                    "no 'Consumption' column; columns found: {headers:?}"
                ))
            })?;

        // First match wins when several date-like columns exist.
        let date = normalized.iter().position(|h| h.contains("date"));
        let avg_temp = normalized
            .iter()
            .position(|h| h.contains("avg") && h.contains("temp"));

        Ok(Self {
            consumption,
            date,
            avg_temp,
        })
    }
}

/// Reduce a decoded table to a [`UsageReport`].
pub fn summarize_table(table: &Table, format: PayloadFormat) -> Result<UsageReport> {
    let columns = ColumnMap::resolve(&table.headers)?;
    if columns.date.is_none() {
        warn!(
            "No date column in usage payload; dates will be absent. Columns: {:?}",
            table.headers
        );
    }

    let mut records = Vec::new();
    let mut total_usage = 0.0;
    let mut latest_usage = 0.0;
    let mut period_start: Option<String> = None;
    let mut period_end: Option<String> = None;
    let mut rows_skipped = 0;
    let mut seen_any = false;

    for row in &table.rows {
        if row.iter().all(Cell::is_empty) {
            continue;
        }

        let Some(consumption) = row.get(columns.consumption).and_then(Cell::as_number) else {
            rows_skipped += 1;
            continue;
        };

        total_usage += consumption;
        latest_usage = consumption;

        let date_cell = columns.date.and_then(|idx| row.get(idx));
        let date_text = date_cell.and_then(Cell::as_date_string);
        if !seen_any {
            period_start.clone_from(&date_text);
            seen_any = true;
        }
        period_end = date_text;

        let Some(date) = date_cell.and_then(Cell::as_date) else {
            continue;
        };
        if consumption < 0.0 {
            warn!(
                "Negative consumption {} on {}; not recorded in history",
                consumption, date
            );
            continue;
        }
        let avg_temp = columns
            .avg_temp
            .and_then(|idx| row.get(idx))
            .and_then(Cell::as_number);
        records.push(UsageRecord::new(date, consumption, avg_temp));
    }

    if rows_skipped > 0 {
        debug!("Skipped {} rows with non-numeric consumption", rows_skipped);
    }

    Ok(UsageReport {
        format,
        columns: table.headers.clone(),
        records,
        total_usage,
        latest_usage,
        period_start,
        period_end,
        rows_skipped,
    })
}

/// Parser for usage downloads.
#[derive(Debug, Clone, Default)]
pub struct UsageParser {
    classifier: ResponseClassifier,
}

impl UsageParser {
    pub fn new(classifier: ResponseClassifier) -> Self {
        Self { classifier }
    }

    /// Parse a raw download into a [`UsageReport`].
    ///
    /// Login and error pages are rejected with an authentication or API error
    /// before any decoding is attempted.
    pub fn parse(&self, bytes: &[u8]) -> Result<UsageReport> {
        let payload = strip_noise(bytes);
        if payload.len() != bytes.len() {
            debug!(
                "Stripped {} bytes of leading/trailing noise from payload",
                bytes.len() - payload.len()
            );
        }

        self.classifier
            .classify_body(payload)
            .into_result("usage download")?;

        let (format, table) = if looks_like_markup(payload) {
            let text = String::from_utf8_lossy(payload);
            (PayloadFormat::Html, extract_first_table(&text)?)
        } else {
            decode_spreadsheet(payload).inspect_err(|e| {
                warn!("{e}; first bytes: {}", byte_prefix(payload));
            })?
        };

        let report = summarize_table(&table, format).inspect_err(|e| {
            warn!("{e} ({format}, first bytes: {})", byte_prefix(payload));
        })?;

        info!(
            "Parsed {}: {} rows, {} dated records, total usage {:.2}",
            report.format,
            table.rows.len(),
            report.records.len(),
            report.total_usage
        );
        Ok(report)
    }
}

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

use gaswatch_portal::{PayloadFormat, PortalError, UsageParser};

/// Three days of daily usage; the last day has no consumption yet.
const DAILY_USAGE_XLSX: &[u8] = include_bytes!("data/daily_usage.xlsx");

fn with_noise(payload: &[u8]) -> Vec<u8> {
    let mut noisy = b"\r\n\r\n  ".to_vec();
    noisy.extend_from_slice(payload);
    noisy.extend_from_slice(b"\r\n");
    noisy
}

#[test]
fn test_xlsx_download_is_parsed() {
    let report = UsageParser::default().parse(DAILY_USAGE_XLSX).unwrap();

    assert_eq!(report.format, PayloadFormat::Xlsx);
    assert_eq!(report.columns, vec!["Weather Date", "Avg Temp", "Consumption"]);
    assert_eq!(report.total_usage, 8.0);
    assert_eq!(report.latest_usage, 3.75);
    assert_eq!(report.rows_skipped, 1);
    assert_eq!(report.period_start.as_deref(), Some("2026-01-28"));
    assert_eq!(report.period_end.as_deref(), Some("2026-01-29"));

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0].date_key(), "2026-01-28");
    assert_eq!(report.records[0].avg_temp, Some(38.0));
    assert_eq!(report.records[1].consumption, 3.75);
}

#[test]
fn test_line_noise_around_xlsx_does_not_change_totals() {
    let parser = UsageParser::default();
    let clean = parser.parse(DAILY_USAGE_XLSX).unwrap();
    let noisy = parser.parse(&with_noise(DAILY_USAGE_XLSX)).unwrap();

    assert_eq!(noisy.format, PayloadFormat::Xlsx);
    assert_eq!(noisy.total_usage, clean.total_usage);
    assert_eq!(noisy.records, clean.records);
}

#[test]
fn test_truncated_xlsx_is_a_format_error() {
    let truncated = &DAILY_USAGE_XLSX[..DAILY_USAGE_XLSX.len() / 2];
    let err = UsageParser::default().parse(truncated).unwrap_err();
    assert!(matches!(err, PortalError::DataParse(_)), "unexpected error: {err}");
}

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

use calamine::{Data, Range, Reader, Xls, Xlsx};
use chrono::{NaiveDate, TimeDelta};
use gaswatch_types::parse_date_key;
use std::fmt::Display;
use std::io::Cursor;
use tracing::debug;

use super::{Cell, PayloadFormat, Table};
use crate::error::{PortalError, Result};

/// Open the first worksheet with reader `R`.
fn read_first_sheet<'a, R>(bytes: &'a [u8]) -> std::result::Result<Range<Data>, String>
where
    R: Reader<Cursor<&'a [u8]>>,
    R::Error: Display,
{
    let mut workbook = R::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;

    let sheet_names = workbook.sheet_names();
    let first = sheet_names
        .first()
        .ok_or_else(|| "no sheets found in workbook".to_owned())?;

    workbook.worksheet_range(first).map_err(|e| e.to_string())
}

/// Decode a spreadsheet payload, trying XLSX first and legacy XLS second.
pub fn decode_spreadsheet(bytes: &[u8]) -> Result<(PayloadFormat, Table)> {
    let xlsx_error = match read_first_sheet::<Xlsx<_>>(bytes) {
        Ok(range) => return Ok((PayloadFormat::Xlsx, table_from_range(&range)?)),
        Err(e) => e,
    };
    debug!("Payload is not XLSX ({}), trying legacy XLS", xlsx_error);

    match read_first_sheet::<Xls<_>>(bytes) {
        Ok(range) => Ok((PayloadFormat::Xls, table_from_range(&range)?)),
        Err(xls_error) => Err(PortalError::DataParse(format!(
            "payload is not a recognised spreadsheet (xlsx: {xlsx_error}; xls: {xls_error})"
        ))),
    }
}

/// Excel serial day number to a calendar date (1900 date system).
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    #[expect(clippy::cast_possible_truncation)]
    let days = serial.floor() as i64;
    epoch.checked_add_signed(TimeDelta::try_days(days)?)
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Int(value) => Cell::Number(*value as f64),
        Data::Float(value) => Cell::Number(*value),
        Data::String(text) if text.trim().is_empty() => Cell::Empty,
        Data::String(text) => Cell::Text(text.clone()),
        Data::Bool(value) => Cell::Text(value.to_string()),
        Data::DateTime(value) => excel_serial_to_date(value.as_f64())
            .map_or_else(|| Cell::Number(value.as_f64()), Cell::Date),
        Data::DateTimeIso(text) => {
            parse_date_key(text).map_or_else(|| Cell::Text(text.clone()), Cell::Date)
        }
        Data::DurationIso(text) => Cell::Text(text.clone()),
        Data::Error(_) | Data::Empty => Cell::Empty,
    }
}

/// Convert a worksheet range; the first row is the header row.
pub fn table_from_range(range: &Range<Data>) -> Result<Table> {
    let mut rows = range.rows();
    let headers = rows
        .next()
        .ok_or_else(|| PortalError::DataParse("worksheet is empty".to_owned()))?
        .iter()
        .map(|cell| cell.to_string().trim().to_owned())
        .collect();

    let rows = rows
        .map(|row| row.iter().map(convert_cell).collect())
        .collect();

    Ok(Table { headers, rows })
}

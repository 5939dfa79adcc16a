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

use scraper::{ElementRef, Html, Selector};

use super::{Cell, Table};
use crate::error::{PortalError, Result};

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| PortalError::DataParse(format!("bad selector '{css}': {e}")))
}

fn cell_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract the first `<table>` of an HTML document.
///
/// The first row holding any cells becomes the header row.
pub fn extract_first_table(html: &str) -> Result<Table> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;

    let table = document.select(&table_sel).next().ok_or_else(|| {
        PortalError::DataParse("HTML payload received but no tables found".to_owned())
    })?;

    let mut rows = table.select(&row_sel).map(|row| {
        row.select(&cell_sel)
            .map(cell_text)
            .collect::<Vec<String>>()
    });

    let headers = rows
        .by_ref()
        .find(|cells| !cells.is_empty())
        .ok_or_else(|| PortalError::DataParse("HTML table has no header row".to_owned()))?;

    let rows = rows
        .filter(|cells| !cells.is_empty())
        .map(|cells| {
            cells
                .into_iter()
                .map(|text| {
                    if text.is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(text)
                    }
                })
                .collect()
        })
        .collect();

    Ok(Table { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_table_only() {
        let html = r"<html><body>
            <table><tr><th>Weather Date</th><th> Consumption </th></tr>
              <tr><td>01/01/2026</td><td>1.0</td></tr>
              <tr><td>01/02/2026</td><td></td></tr>
            </table>
            <table><tr><th>Other</th></tr><tr><td>x</td></tr></table>
        </body></html>";
        let table = extract_first_table(html).unwrap();
        assert_eq!(table.headers, vec!["Weather Date", "Consumption"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1][1], Cell::Empty);
    }

    #[test]
    fn test_td_header_row_is_accepted() {
        let html = "<table><tr><td>Date</td><td>Consumption</td></tr><tr><td>2026-02-01</td><td>2</td></tr></table>";
        let table = extract_first_table(html).unwrap();
        assert_eq!(table.headers, vec!["Date", "Consumption"]);
        assert_eq!(table.rows, vec![vec![
            Cell::Text("2026-02-01".to_owned()),
            Cell::Text("2".to_owned())
        ]]);
    }

    #[test]
    fn test_no_table() {
        let err = extract_first_table("<html><body><p>Nothing</p></body></html>").unwrap_err();
        assert!(err.to_string().contains("no tables found"));
    }

    #[test]
    fn test_empty_table() {
        let err = extract_first_table("<html><table></table></html>").unwrap_err();
        assert!(matches!(err, PortalError::DataParse(_)));
    }
}

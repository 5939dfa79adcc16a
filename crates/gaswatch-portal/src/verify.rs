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

//! Response verification heuristics.
//!
//! The portal never answers an expired session with a distinguishing status
//! code. It answers 200 with either a redirect to the login page or an HTML
//! error page, sometimes served where a spreadsheet was requested. Every fetch
//! path therefore classifies the final URL and, for markup bodies, a bounded
//! prefix of the content.
//!
//! The phrase lists are data, not code: [`IndicatorTable`] deserialises from
//! config and [`IndicatorTable::extend`] appends newly observed portal wording.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PortalError;

/// Classification of a portal response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    /// Login page or ended session; carries the indicator that matched
    AuthRequired(String),
    /// Generic portal-side failure; carries the indicator that matched
    PortalError(String),
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Turn a non-OK outcome into the matching typed error.
    pub fn into_result(self, context: &str) -> Result<(), PortalError> {
        match self {
            Self::Ok => Ok(()),
            Self::AuthRequired(indicator) => Err(PortalError::Authentication(format!(
                "{context}: login required ({indicator})"
            ))),
            Self::PortalError(indicator) => Err(PortalError::api(format!(
                "{context}: portal error page ({indicator})"
            ))),
        }
    }
}

/// Hand-maintained indicator lists, matched case-insensitively as substrings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorTable {
    /// Final-URL fragments of the login / authenticate pages
    pub login_url_markers: Vec<String>,

    /// Final-URL fragments of the portal's generic error landing page
    pub error_url_markers: Vec<String>,

    /// Body phrases only a sign-in page carries
    pub login_phrases: Vec<String>,

    /// Body phrases of an ended session; same remediation as a login page
    pub session_phrases: Vec<String>,

    /// Body phrases of a generic server-side failure
    pub portal_error_phrases: Vec<String>,

    /// Bytes of a markup body inspected for phrases
    pub scan_limit: usize,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

impl Default for IndicatorTable {
    fn default() -> Self {
        Self {
            login_url_markers: owned(&["/logon/login", "/logon/authenticate", "/login.html"]),
            error_url_markers: owned(&["/success_error", "/errors/", "/error.html"]),
            // Kept specific: navigation menus on valid pages say "login" too.
            login_phrases: owned(&[
                "<h1>login</h1>",
                "type=\"password\"",
                "name=\"password\"",
                "name=\"username\"",
                "action=\"authenticate.html\"",
                "invalid username or password",
                "sign in to your account",
                "please log in to continue",
            ]),
            session_phrases: owned(&[
                "your session has expired",
                "session has timed out",
                "due to inactivity",
                "access denied",
                "you have been logged out",
            ]),
            portal_error_phrases: owned(&[
                "an error has occurred",
                "an unexpected error",
                "experiencing technical difficulties",
                "temporarily unavailable",
                "scheduled maintenance",
            ]),
            scan_limit: 16 * 1024,
        }
    }
}

fn append_lowercase(target: &mut Vec<String>, extra: &[String]) {
    for item in extra {
        let item = item.trim().to_lowercase();
        if !item.is_empty() && !target.contains(&item) {
            target.push(item);
        }
    }
}

impl IndicatorTable {
    /// Append every entry of `extra` that is not already present.
    pub fn extend(&mut self, extra: &IndicatorTable) {
        append_lowercase(&mut self.login_url_markers, &extra.login_url_markers);
        append_lowercase(&mut self.error_url_markers, &extra.error_url_markers);
        append_lowercase(&mut self.login_phrases, &extra.login_phrases);
        append_lowercase(&mut self.session_phrases, &extra.session_phrases);
        append_lowercase(&mut self.portal_error_phrases, &extra.portal_error_phrases);
    }

    fn normalized(mut self) -> Self {
        for list in [
            &mut self.login_url_markers,
            &mut self.error_url_markers,
            &mut self.login_phrases,
            &mut self.session_phrases,
            &mut self.portal_error_phrases,
        ] {
            for item in list.iter_mut() {
                *item = item.trim().to_lowercase();
            }
            list.retain(|item| !item.is_empty());
        }
        self
    }
}

/// True when the payload starts like an HTML document.
///
/// Binary spreadsheets never match, so their content is never sniffed.
pub fn looks_like_markup(body: &[u8]) -> bool {
    let trimmed = body.trim_ascii_start();
    let prefix = &trimmed[..trimmed.len().min(16)];
    let prefix = String::from_utf8_lossy(prefix).to_lowercase();
    prefix.starts_with("<!doctype") || prefix.starts_with("<html")
}

#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    table: IndicatorTable,
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new(IndicatorTable::default())
    }
}

impl ResponseClassifier {
    pub fn new(table: IndicatorTable) -> Self {
        Self {
            table: table.normalized(),
        }
    }

    pub fn table(&self) -> &IndicatorTable {
        &self.table
    }

    /// Classify a response by its final URL (cheap) and then its content.
    pub fn classify(&self, final_url: Option<&str>, body: &[u8]) -> Outcome {
        if let Some(url) = final_url {
            let outcome = self.classify_url(url);
            if !outcome.is_ok() {
                return outcome;
            }
        }
        self.classify_body(body)
    }

    pub fn classify_url(&self, url: &str) -> Outcome {
        let url = url.to_lowercase();
        if let Some(marker) = first_match(&url, &self.table.login_url_markers) {
            debug!("Final URL {} matches login marker '{}'", url, marker);
            return Outcome::AuthRequired(format!("redirected to {marker}"));
        }
        if let Some(marker) = first_match(&url, &self.table.error_url_markers) {
            debug!("Final URL {} matches error marker '{}'", url, marker);
            return Outcome::PortalError(format!("redirected to {marker}"));
        }
        Outcome::Ok
    }

    /// Look only for portal-side failures, for pages that are expected to be
    /// sign-in pages themselves.
    pub fn classify_portal_error(&self, final_url: &str, body: &[u8]) -> Outcome {
        let url = final_url.to_lowercase();
        if let Some(marker) = first_match(&url, &self.table.error_url_markers) {
            return Outcome::PortalError(format!("redirected to {marker}"));
        }
        let Some(text) = self.scan_text(body) else {
            return Outcome::Ok;
        };
        match first_match(&text, &self.table.portal_error_phrases) {
            Some(phrase) => Outcome::PortalError(format!("error page: '{phrase}'")),
            None => Outcome::Ok,
        }
    }

    /// Lowercased, bounded prefix of a markup body; `None` for anything else.
    fn scan_text(&self, body: &[u8]) -> Option<String> {
        if !looks_like_markup(body) {
            return None;
        }
        let trimmed = body.trim_ascii_start();
        let prefix = &trimmed[..trimmed.len().min(self.table.scan_limit)];
        Some(String::from_utf8_lossy(prefix).to_lowercase())
    }

    pub fn classify_body(&self, body: &[u8]) -> Outcome {
        let Some(text) = self.scan_text(body) else {
            return Outcome::Ok;
        };

        if let Some(phrase) = first_match(&text, &self.table.login_phrases) {
            return Outcome::AuthRequired(format!("login page: '{phrase}'"));
        }
        if let Some(phrase) = first_match(&text, &self.table.session_phrases) {
            return Outcome::AuthRequired(format!("session ended: '{phrase}'"));
        }
        if let Some(phrase) = first_match(&text, &self.table.portal_error_phrases) {
            return Outcome::PortalError(format!("error page: '{phrase}'"));
        }
        Outcome::Ok
    }
}

fn first_match<'a>(haystack: &str, needles: &'a [String]) -> Option<&'a str> {
    needles
        .iter()
        .find(|needle| haystack.contains(needle.as_str()))
        .map(String::as_str)
}

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

//! Gas utility portal client.
//!
//! Rate-limited session handling and login, classification of the portal's
//! disguised login/error responses, and parsing of the daily usage download.

pub mod config;
pub mod error;
pub mod parser;
pub mod rate_limit;
pub mod session;
pub mod verify;

pub use config::{DEFAULT_BASE_URL, PortalConfig, PortalEndpoints};
pub use error::{PortalError, Remediation, Result};
pub use parser::{PayloadFormat, UsageParser, UsageReport};
pub use rate_limit::{RateGate, RetryPolicy, cancellable_sleep};
pub use session::{FetchRequest, FetchedPage, PortalClient};
pub use verify::{IndicatorTable, Outcome, ResponseClassifier};

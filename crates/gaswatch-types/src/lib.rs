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

//! Shared data model for GasWatch.
//!
//! These types flow between the portal client, the history store and the
//! presentation layer. None of them perform I/O.

pub mod dates;
pub mod model;
pub mod snapshot;
pub mod usage;

pub use dates::{normalize_date_key, parse_date_key};
pub use model::{
    DEFAULT_BALANCE_TEMP, DEFAULT_BASE_LOAD, DEFAULT_HEATING_COEFF, MIN_BASE_LOAD, RegressionModel,
};
pub use snapshot::AccountSnapshot;
pub use usage::{Credentials, UsageRecord};

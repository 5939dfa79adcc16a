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

use serde::{Deserialize, Serialize};

/// Externally visible result of one acquisition cycle.
///
/// Dates are kept as the normalised strings the parser produced; the portal's
/// formats vary too much to promise a stricter type here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Last reporting day in the current billing period
    pub bill_date: Option<String>,

    /// First reporting day in the current billing period
    pub billing_period_start: Option<String>,

    /// Total consumption for the period so far
    pub total_usage: f64,

    /// Consumption reported for the most recent day
    pub latest_daily_usage: f64,
}

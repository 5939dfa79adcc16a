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

pub const DEFAULT_BASE_LOAD: f64 = 1.23;
pub const DEFAULT_HEATING_COEFF: f64 = 0.097;
pub const DEFAULT_BALANCE_TEMP: f64 = 65.0;

/// Floor applied to a fitted intercept
pub const MIN_BASE_LOAD: f64 = 0.1;

/// Degree-day consumption model:
/// `usage ≈ base_load + heating_coeff × max(0, balance_temp − avg_temp)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionModel {
    /// Daily usage independent of weather (water heating, cooking)
    pub base_load: f64,

    /// Additional usage per heating degree-day
    pub heating_coeff: f64,

    /// Outdoor temperature (°F) above which no heating is expected
    pub balance_temp: f64,

    /// Goodness of fit; 0 when the defaults are in use
    pub r_squared: f64,
}

impl Default for RegressionModel {
    fn default() -> Self {
        Self {
            base_load: DEFAULT_BASE_LOAD,
            heating_coeff: DEFAULT_HEATING_COEFF,
            balance_temp: DEFAULT_BALANCE_TEMP,
            r_squared: 0.0,
        }
    }
}

impl RegressionModel {
    pub fn degree_days(&self, avg_temp: f64) -> f64 {
        (self.balance_temp - avg_temp).max(0.0)
    }

    /// Expected daily usage at the given average temperature.
    pub fn predict(&self, avg_temp: f64) -> f64 {
        self.base_load + self.heating_coeff * self.degree_days(avg_temp)
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_above_balance_is_base_load() {
        let model = RegressionModel::default();
        assert!((model.predict(80.0) - DEFAULT_BASE_LOAD).abs() < 1e-12);
    }

    #[test]
    fn test_predict_below_balance() {
        let model = RegressionModel {
            base_load: 1.5,
            heating_coeff: 0.1,
            balance_temp: 65.0,
            r_squared: 0.9,
        };
        assert!((model.predict(45.0) - 3.5).abs() < 1e-9);
        assert!(!model.is_default());
        assert!(RegressionModel::default().is_default());
    }

    #[test]
    fn test_model_json_field_names() {
        let value = serde_json::to_value(RegressionModel::default()).unwrap();
        assert_eq!(value["base_load"], 1.23);
        assert_eq!(value["heating_coeff"], 0.097);
        assert_eq!(value["balance_temp"], 65.0);
        assert_eq!(value["r_squared"], 0.0);
    }
}

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

fn default_fixed_cost() -> f64 {
    25.03
}

fn default_usage_rate() -> f64 {
    2.40
}

fn default_tax_percent() -> f64 {
    8.0
}

/// Tariff used for the period cost estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BillingRates {
    /// Monthly customer charge
    #[serde(default = "default_fixed_cost")]
    pub fixed_cost: f64,

    /// Price per volume unit consumed
    #[serde(default = "default_usage_rate")]
    pub usage_rate: f64,

    #[serde(default = "default_tax_percent")]
    pub tax_percent: f64,
}

impl Default for BillingRates {
    fn default() -> Self {
        Self {
            fixed_cost: default_fixed_cost(),
            usage_rate: default_usage_rate(),
            tax_percent: default_tax_percent(),
        }
    }
}

impl BillingRates {
    /// Estimated bill for `total_usage`, rounded to cents.
    pub fn estimate(&self, total_usage: f64) -> f64 {
        let subtotal = self.fixed_cost + total_usage * self.usage_rate;
        let total = subtotal * (1.0 + self.tax_percent / 100.0);
        (total * 100.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_with_default_rates() {
        let rates = BillingRates::default();
        // (25.03 + 10 * 2.40) * 1.08 = 52.9524
        assert_eq!(rates.estimate(10.0), 52.95);
        // Fixed charge only
        assert_eq!(rates.estimate(0.0), 27.03);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let rates: BillingRates = serde_json::from_str(r#"{"usage_rate": 1.5}"#).unwrap();
        assert_eq!(rates.usage_rate, 1.5);
        assert_eq!(rates.fixed_cost, 25.03);
        assert_eq!(rates.estimate(0.0), 27.03);
    }
}

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

//! Degree-day regression.
//!
//! Fits `usage ≈ base_load + heating_coeff × max(0, balance_temp − avg_temp)`
//! by ordinary least squares for each candidate balance temperature on a
//! bounded grid and keeps the candidate with the smallest squared error.

use gaswatch_types::{DEFAULT_BALANCE_TEMP, MIN_BASE_LOAD, RegressionModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const PLAUSIBLE_BALANCE: (f64, f64) = (50.0, 80.0);
const TYPICAL_BALANCE: (f64, f64) = (58.0, 72.0);
const VARIANCE_EPSILON: f64 = 1e-12;

fn default_min_points() -> usize {
    10
}

fn default_grid_min() -> f64 {
    55.0
}

fn default_grid_max() -> f64 {
    75.0
}

fn default_grid_step() -> f64 {
    0.5
}

fn default_retention_days() -> i64 {
    90
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Usable points required before any fit is attempted
    #[serde(default = "default_min_points")]
    pub min_points: usize,

    /// Balance temperature search range (°F)
    #[serde(default = "default_grid_min")]
    pub grid_min: f64,
    #[serde(default = "default_grid_max")]
    pub grid_max: f64,

    /// Candidate spacing of a full search (°F)
    #[serde(default = "default_grid_step")]
    pub grid_step: f64,

    /// New usable points since the last full search that trigger another
    #[serde(default = "default_min_points")]
    pub full_search_threshold: usize,

    /// Days of history kept
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            min_points: default_min_points(),
            grid_min: default_grid_min(),
            grid_max: default_grid_max(),
            grid_step: default_grid_step(),
            full_search_threshold: default_min_points(),
            retention_days: default_retention_days(),
        }
    }
}

impl ModelConfig {
    /// Candidate balance temperatures, inclusive of both bounds.
    pub fn candidates(&self) -> Vec<f64> {
        if self.grid_step.is_nan() || self.grid_step <= 0.0 || self.grid_max < self.grid_min {
            return vec![DEFAULT_BALANCE_TEMP];
        }

        let mut candidates = Vec::new();
        let mut index = 0u32;
        loop {
            let value = self.grid_min + self.grid_step * f64::from(index);
            if value > self.grid_max + 1e-9 {
                break;
            }
            candidates.push(value);
            index += 1;
        }
        candidates
    }
}

/// Least-squares result for one balance temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
    pub sse: f64,
    pub r_squared: f64,
}

/// OLS of usage on heating degree-days at `balance_temp`.
///
/// `None` when every point has the same degree-day value.
pub fn fit_at(points: &[(f64, f64)], balance_temp: f64) -> Option<LinearFit> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let xs: Vec<f64> = points
        .iter()
        .map(|(temp, _)| (balance_temp - temp).max(0.0))
        .collect();
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, usage)| usage).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut sst = 0.0;
    for (x, (_, y)) in xs.iter().zip(points) {
        sxx += (x - mean_x).powi(2);
        sxy += (x - mean_x) * (y - mean_y);
        sst += (y - mean_y).powi(2);
    }
    if sxx < VARIANCE_EPSILON {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let sse: f64 = xs
        .iter()
        .zip(points)
        .map(|(x, (_, y))| (y - (intercept + slope * x)).powi(2))
        .sum();
    let r_squared = if sst > VARIANCE_EPSILON {
        1.0 - sse / sst
    } else {
        0.0
    };

    Some(LinearFit {
        intercept,
        slope,
        sse,
        r_squared,
    })
}

/// Best candidate by squared error; ties go to the candidate nearest the
/// default balance temperature.
pub fn grid_search(points: &[(f64, f64)], candidates: &[f64]) -> Option<(f64, LinearFit)> {
    let mut best: Option<(f64, LinearFit)> = None;

    for &balance in candidates {
        let Some(fit) = fit_at(points, balance) else {
            continue;
        };
        best = match best {
            None => Some((balance, fit)),
            Some((best_balance, best_fit)) => {
                let tolerance = 1e-9 * best_fit.sse.max(1.0);
                let better = fit.sse < best_fit.sse - tolerance
                    || ((fit.sse - best_fit.sse).abs() <= tolerance
                        && (balance - DEFAULT_BALANCE_TEMP).abs()
                            < (best_balance - DEFAULT_BALANCE_TEMP).abs());
                if better {
                    Some((balance, fit))
                } else {
                    Some((best_balance, best_fit))
                }
            }
        };
    }
    best
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FitKind {
    /// Not enough data; documented defaults
    Default,
    /// Grid search over every candidate
    Full,
    /// Slope and intercept refit at the previous balance temperature
    Quick,
}

/// Stateful fitter that decides between full and quick updates.
#[derive(Debug, Clone)]
pub struct ModelFitter {
    config: ModelConfig,
    model: Option<RegressionModel>,
    /// New usable points seen since the last full search; `None` until one ran
    new_since_full_search: Option<usize>,
}

impl ModelFitter {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            model: None,
            new_since_full_search: None,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Latest fitted model, or the defaults before the first fit.
    pub fn model(&self) -> RegressionModel {
        self.model.unwrap_or_default()
    }

    pub fn has_fit(&self) -> bool {
        self.model.is_some()
    }

    fn needs_full_search(&self) -> bool {
        match (self.new_since_full_search, self.model) {
            (Some(new_points), Some(model)) if !model.is_default() => {
                new_points >= self.config.full_search_threshold
            }
            _ => true,
        }
    }

    /// Recompute the model from `(avg_temp, usage)` points, `new_points` of
    /// which were not part of the previous fit.
    ///
    /// A window that adds and expires points at the same rate keeps its size,
    /// so the full search is driven by arrivals, not by the point count.
    pub fn refit(
        &mut self,
        points: &[(f64, f64)],
        new_points: usize,
    ) -> (RegressionModel, FitKind) {
        if let Some(seen) = self.new_since_full_search.as_mut() {
            *seen += new_points;
        }

        if points.len() < self.config.min_points {
            debug!(
                "Only {} usable points (need {}); using default model",
                points.len(),
                self.config.min_points
            );
            let model = RegressionModel::default();
            self.model = Some(model);
            self.new_since_full_search = None;
            return (model, FitKind::Default);
        }

        let quick = if self.needs_full_search() {
            None
        } else {
            let balance = self.model().balance_temp;
            fit_at(points, balance).map(|fit| (balance, fit))
        };

        let (kind, found) = match quick {
            Some(found) => (FitKind::Quick, Some(found)),
            None => {
                self.new_since_full_search = Some(0);
                (FitKind::Full, grid_search(points, &self.config.candidates()))
            }
        };

        let model = match found {
            Some((balance, fit)) => apply_guardrails(balance, fit, points),
            None => {
                warn!("No balance temperature gives any spread in degree-days; using default model");
                RegressionModel::default()
            }
        };

        info!(
            "📈 [MODEL] {:?} fit on {} points: base_load={:.3}, heating_coeff={:.4}, balance_temp={:.1}°F, R²={:.3}",
            kind,
            points.len(),
            model.base_load,
            model.heating_coeff,
            model.balance_temp,
            model.r_squared
        );
        self.model = Some(model);
        (model, kind)
    }
}

fn apply_guardrails(balance_temp: f64, fit: LinearFit, points: &[(f64, f64)]) -> RegressionModel {
    let mut model = RegressionModel {
        base_load: fit.intercept,
        heating_coeff: fit.slope,
        balance_temp,
        r_squared: fit.r_squared,
    };

    if fit.slope < 0.0 {
        warn!(
            "Usage rises with temperature (slope {:.4}); clamping heating coefficient to 0",
            fit.slope
        );
        let mean_usage = points.iter().map(|(_, usage)| usage).sum::<f64>() / points.len() as f64;
        model.heating_coeff = 0.0;
        model.base_load = mean_usage;
        model.r_squared = 0.0;
    }

    if model.base_load < MIN_BASE_LOAD {
        warn!(
            "Fitted base load {:.3} below minimum; using {}",
            model.base_load, MIN_BASE_LOAD
        );
        model.base_load = MIN_BASE_LOAD;
    }

    if !(PLAUSIBLE_BALANCE.0..=PLAUSIBLE_BALANCE.1).contains(&model.balance_temp) {
        warn!(
            "Balance temperature {:.1}°F outside plausible range; using {}°F",
            model.balance_temp, DEFAULT_BALANCE_TEMP
        );
        model.balance_temp = DEFAULT_BALANCE_TEMP;
    } else if !(TYPICAL_BALANCE.0..=TYPICAL_BALANCE.1).contains(&model.balance_temp) {
        info!(
            "Balance temperature {:.1}°F is unusual for a home",
            model.balance_temp
        );
    }

    model
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaswatch_types::{DEFAULT_BASE_LOAD, DEFAULT_HEATING_COEFF};

    fn generate(
        base: f64,
        coeff: f64,
        balance: f64,
        temps: impl Iterator<Item = i32>,
    ) -> Vec<(f64, f64)> {
        temps
            .map(f64::from)
            .map(|t| (t, base + coeff * (balance - t).max(0.0)))
            .collect()
    }

    #[test]
    fn test_insufficient_points_gives_defaults() {
        let mut fitter = ModelFitter::new(ModelConfig::default());
        let points = generate(1.5, 0.1, 65.0, 30..39);
        assert_eq!(points.len(), 9);

        let (model, kind) = fitter.refit(&points, points.len());
        assert_eq!(kind, FitKind::Default);
        assert_eq!(model.base_load, DEFAULT_BASE_LOAD);
        assert_eq!(model.heating_coeff, DEFAULT_HEATING_COEFF);
        assert_eq!(model.balance_temp, DEFAULT_BALANCE_TEMP);
        assert_eq!(model.r_squared, 0.0);
    }

    #[test]
    fn test_recovers_known_model() {
        let points = generate(1.5, 0.1, 65.0, 20..=90);
        let (model, kind) = ModelFitter::new(ModelConfig::default()).refit(&points, points.len());

        assert_eq!(kind, FitKind::Full);
        assert!((model.base_load - 1.5).abs() < 1e-6, "{model:?}");
        assert!((model.heating_coeff - 0.1).abs() < 1e-6, "{model:?}");
        assert!((model.balance_temp - 65.0).abs() <= 0.5, "{model:?}");
        assert!(model.r_squared > 0.99);
    }

    #[test]
    fn test_detects_other_balance_temperature() {
        let points = generate(2.0, 0.15, 70.0, 30..=90);
        let (model, _) = ModelFitter::new(ModelConfig::default()).refit(&points, points.len());
        assert!((model.balance_temp - 70.0).abs() < 1e-9, "{model:?}");
        assert!((model.heating_coeff - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_inverse_relationship_clamped() {
        let points: Vec<(f64, f64)> = (20..=80)
            .map(f64::from)
            .map(|t| (t, 0.5 + 0.05 * t))
            .collect();
        let (model, _) = ModelFitter::new(ModelConfig::default()).refit(&points, points.len());
        assert_eq!(model.heating_coeff, 0.0);
        assert_eq!(model.r_squared, 0.0);
        assert!(model.base_load >= MIN_BASE_LOAD);
    }

    #[test]
    fn test_zero_variance_never_selected() {
        // Every temperature above the grid: no degree-days anywhere
        let points: Vec<(f64, f64)> = (0..12).map(|i| (80.0 + f64::from(i), 1.0)).collect();
        assert!(fit_at(&points, 65.0).is_none());
        assert!(grid_search(&points, &ModelConfig::default().candidates()).is_none());

        let (model, _) = ModelFitter::new(ModelConfig::default()).refit(&points, points.len());
        assert!(model.base_load.is_finite());
        assert_eq!(model, RegressionModel::default());
    }

    #[test]
    fn test_negative_intercept_floored() {
        let points = generate(-0.5, 0.2, 65.0, 20..=64);
        let (model, _) = ModelFitter::new(ModelConfig::default()).refit(&points, points.len());
        assert_eq!(model.base_load, MIN_BASE_LOAD);
    }

    #[test]
    fn test_quick_refit_holds_balance_until_threshold() {
        let mut fitter = ModelFitter::new(ModelConfig::default());
        let mut points = generate(1.5, 0.1, 65.0, 20..=59);
        let (first, kind) = fitter.refit(&points, points.len());
        assert_eq!(kind, FitKind::Full);

        points.extend(generate(1.5, 0.1, 65.0, 60..=64));
        let (second, kind) = fitter.refit(&points, 5);
        assert_eq!(kind, FitKind::Quick);
        assert_eq!(second.balance_temp, first.balance_temp);

        points.extend(generate(1.5, 0.1, 65.0, 65..=69));
        let (_, kind) = fitter.refit(&points, 5);
        assert_eq!(kind, FitKind::Full);

        let (_, kind) = fitter.refit(&points, 0);
        assert_eq!(kind, FitKind::Quick);
    }

    #[test]
    fn test_full_search_runs_when_window_size_is_steady() {
        let mut fitter = ModelFitter::new(ModelConfig::default());
        let mut window = generate(1.5, 0.1, 65.0, 30..60);
        assert_eq!(fitter.refit(&window, window.len()).1, FitKind::Full);

        let mut kinds = Vec::new();
        for day in 0..15 {
            // One day expires, one day arrives
            window.remove(0);
            window.extend(generate(1.5, 0.1, 70.0, std::iter::once(30 + day % 30)));
            assert_eq!(window.len(), 30);
            kinds.push(fitter.refit(&window, 1).1);
        }

        assert!(kinds[..9].iter().all(|kind| *kind == FitKind::Quick), "{kinds:?}");
        assert_eq!(kinds[9], FitKind::Full, "{kinds:?}");
        assert!(kinds[10..].iter().all(|kind| *kind == FitKind::Quick), "{kinds:?}");
    }

    #[test]
    fn test_refit_is_deterministic() {
        let points = generate(1.2, 0.08, 62.0, 10..=80);
        let (a, _) = ModelFitter::new(ModelConfig::default()).refit(&points, points.len());
        let (b, _) = ModelFitter::new(ModelConfig::default()).refit(&points, points.len());
        assert_eq!(a, b);
    }

    #[test]
    fn test_candidates_cover_bounds() {
        let candidates = ModelConfig::default().candidates();
        assert_eq!(candidates.len(), 41);
        assert_eq!(candidates.first(), Some(&55.0));
        assert_eq!(candidates.last(), Some(&75.0));
    }
}

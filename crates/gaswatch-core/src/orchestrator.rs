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

//! Acquisition cycle: authenticate, download, parse, merge, prune, refit,
//! persist, schedule.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gaswatch_portal::{PortalClient, Remediation, UsageReport};
use gaswatch_types::{AccountSnapshot, RegressionModel};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::billing::BillingRates;
use crate::error::{CycleError, Result};
use crate::history::{History, HistoryPhase};
use crate::regression::{ModelConfig, ModelFitter};
use crate::scheduling::Schedule;
use crate::storage::{HistoryStorage, StoredHistory};

/// Period totals above this are logged as suspicious.
const UNUSUAL_TOTAL_USAGE: f64 = 10_000.0;

/// Where usage data comes from. Implemented by [`PortalClient`].
#[async_trait]
pub trait UsageSource: Send + Sync {
    async fn ensure_authenticated(
        &self,
        cancel: &CancellationToken,
    ) -> gaswatch_portal::Result<()>;

    async fn download_usage(
        &self,
        cancel: &CancellationToken,
    ) -> gaswatch_portal::Result<UsageReport>;
}

#[async_trait]
impl UsageSource for PortalClient {
    async fn ensure_authenticated(
        &self,
        cancel: &CancellationToken,
    ) -> gaswatch_portal::Result<()> {
        PortalClient::ensure_authenticated(self, cancel).await
    }

    async fn download_usage(
        &self,
        cancel: &CancellationToken,
    ) -> gaswatch_portal::Result<UsageReport> {
        PortalClient::download_usage(self, cancel).await
    }
}

#[derive(Debug, Clone, Default)]
pub struct CycleSettings {
    pub schedule: Schedule,
    pub model: ModelConfig,
    pub billing: BillingRates,
}

/// Result of a completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub snapshot: AccountSnapshot,
    pub model: RegressionModel,
    pub estimated_cost: f64,
    pub records_added: usize,
    pub records_pruned: usize,
    pub recalculated: bool,
    pub next_run: DateTime<Utc>,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    Failed {
        error: CycleError,
        next_run: DateTime<Utc>,
    },
}

impl CycleOutcome {
    /// When the next cycle should run; present on every outcome.
    pub fn next_run(&self) -> DateTime<Utc> {
        match self {
            Self::Completed(report) => report.next_run,
            Self::Failed { next_run, .. } => *next_run,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Failed { .. } => None,
        }
    }
}

struct CycleState {
    history: History,
    document: StoredHistory,
    fitter: ModelFitter,
}

struct CycleSummary {
    snapshot: AccountSnapshot,
    model: RegressionModel,
    records_added: usize,
    records_pruned: usize,
    recalculated: bool,
}

/// Owns the history and drives one account's acquisition cycles.
///
/// Cycles never overlap: a cycle requested while another is running fails
/// with [`CycleError::CycleInProgress`].
pub struct Orchestrator {
    source: Arc<dyn UsageSource>,
    storage: Arc<dyn HistoryStorage>,
    settings: CycleSettings,
    state: Mutex<CycleState>,
    latest: parking_lot::Mutex<Option<CycleReport>>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn UsageSource>,
        storage: Arc<dyn HistoryStorage>,
        settings: CycleSettings,
    ) -> Self {
        let fitter = ModelFitter::new(settings.model.clone());
        Self {
            source,
            storage,
            settings,
            state: Mutex::new(CycleState {
                history: History::new(),
                document: StoredHistory::default(),
                fitter,
            }),
            latest: parking_lot::Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    /// Report of the last successful cycle, for presentation.
    pub fn latest_report(&self) -> Option<CycleReport> {
        self.latest.lock().clone()
    }

    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.settings.schedule.next_run_after(now)
    }

    /// Run one cycle. The next run time is computed whatever happens.
    pub async fn run_cycle(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> CycleOutcome {
        let result = match self.state.try_lock() {
            Ok(mut state) => self.execute(&mut state, now, cancel).await,
            Err(_) => Err(CycleError::CycleInProgress),
        };
        let next_run = self.next_run_after(now);

        match result {
            Ok(summary) => {
                let report = CycleReport {
                    estimated_cost: self.settings.billing.estimate(summary.snapshot.total_usage),
                    snapshot: summary.snapshot,
                    model: summary.model,
                    records_added: summary.records_added,
                    records_pruned: summary.records_pruned,
                    recalculated: summary.recalculated,
                    next_run,
                };
                info!(
                    "✅ [CYCLE] Completed: total usage {:.2}, est. cost {:.2}, +{} / -{} records, next run {}",
                    report.snapshot.total_usage,
                    report.estimated_cost,
                    report.records_added,
                    report.records_pruned,
                    report.next_run
                );
                *self.latest.lock() = Some(report.clone());
                CycleOutcome::Completed(report)
            }
            Err(error) => {
                log_failure(&error);
                info!("Next acquisition cycle at {}", next_run);
                CycleOutcome::Failed { error, next_run }
            }
        }
    }

    async fn execute(
        &self,
        state: &mut CycleState,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<CycleSummary> {
        if state.history.phase() == HistoryPhase::Uninitialized {
            let (history, document) = History::load(self.storage.as_ref())?;
            state.history = history;
            state.document = document;
        }

        info!("🔄 [CYCLE] Starting acquisition cycle");
        self.source.ensure_authenticated(cancel).await?;
        let report = self.source.download_usage(cancel).await?;

        let mut snapshot = report.snapshot();
        check_usage_sanity(&mut snapshot);

        let today = self.settings.schedule.local_date(now);
        let before: BTreeSet<String> = state.history.keys().map(str::to_owned).collect();
        state.history.merge(&report.records);
        state
            .history
            .prune(today, self.settings.model.retention_days);

        // Counted on the key set, so a day merged and expired in the same
        // cycle is neither added nor pruned
        let arrived: Vec<&str> = state
            .history
            .keys()
            .filter(|key| !before.contains(*key))
            .collect();
        let records_added = arrived.len();
        let new_points = arrived
            .iter()
            .filter(|key| state.history.is_usable(key))
            .count();
        let records_pruned = before
            .iter()
            .filter(|key| !state.history.contains_key(key))
            .count();

        // The first cycle after start-up fits even without changes
        let recalculated =
            records_added > 0 || records_pruned > 0 || !state.fitter.has_fit();
        let model = if recalculated {
            state.history.begin_recalculation();
            let points = state.history.usable_points();
            let (model, kind) = state.fitter.refit(&points, new_points);
            state.history.finish_recalculation();
            debug!("Model recalculated ({:?})", kind);
            model
        } else {
            debug!("History unchanged; keeping current model");
            state.fitter.model()
        };

        if state.history.has_pending_changes() {
            let mut document = state.document.clone();
            let touched = state.history.write_changes(&mut document);
            self.storage.save(&document)?;
            state.document = document;
            state.history.mark_saved();
            debug!("Persisted {} changed history keys", touched);
        }

        Ok(CycleSummary {
            snapshot,
            model,
            records_added,
            records_pruned,
            recalculated,
        })
    }
}

/// Run a cycle on its own task so a panic inside it becomes a failed cycle
/// instead of taking the caller down.
pub async fn run_cycle_isolated(
    orchestrator: Arc<Orchestrator>,
    now: DateTime<Utc>,
    cancel: CancellationToken,
) -> CycleOutcome {
    let worker = Arc::clone(&orchestrator);
    let handle = tokio::spawn(async move { worker.run_cycle(now, &cancel).await });

    match handle.await {
        Ok(outcome) => outcome,
        Err(join_error) => {
            let error = CycleError::Unexpected(join_error.to_string());
            log_failure(&error);
            CycleOutcome::Failed {
                error,
                next_run: orchestrator.next_run_after(now),
            }
        }
    }
}

fn check_usage_sanity(snapshot: &mut AccountSnapshot) {
    if snapshot.total_usage < 0.0 {
        warn!(
            "Negative total usage {:.2} reported; clamping to 0",
            snapshot.total_usage
        );
        snapshot.total_usage = 0.0;
    } else if snapshot.total_usage > UNUSUAL_TOTAL_USAGE {
        warn!(
            "Unusually high total usage {:.2} for one billing period",
            snapshot.total_usage
        );
    }
}

fn log_failure(error: &CycleError) {
    match error.remediation() {
        Remediation::Reauthenticate => {
            error!("🔐 [CYCLE] Authentication failed, new credentials needed: {error}");
        }
        Remediation::ReportFormatChange => {
            error!("❌ [CYCLE] Usage download format not understood: {error}");
        }
        Remediation::RetryLater => {
            warn!("⚠️ [CYCLE] Cycle failed, will retry on schedule: {error}");
        }
        Remediation::None => {
            info!("Cycle skipped: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanity_clamps_negative_total() {
        let mut snapshot = AccountSnapshot {
            total_usage: -4.0,
            ..Default::default()
        };
        check_usage_sanity(&mut snapshot);
        assert_eq!(snapshot.total_usage, 0.0);

        let mut snapshot = AccountSnapshot {
            total_usage: 12_000.0,
            ..Default::default()
        };
        check_usage_sanity(&mut snapshot);
        assert_eq!(snapshot.total_usage, 12_000.0);
    }

    #[test]
    fn test_outcome_accessors() {
        let next_run = Utc::now();
        let outcome = CycleOutcome::Failed {
            error: CycleError::CycleInProgress,
            next_run,
        };
        assert!(!outcome.is_success());
        assert!(outcome.report().is_none());
        assert_eq!(outcome.next_run(), next_run);
    }
}

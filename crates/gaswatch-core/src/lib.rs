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

pub mod billing;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod regression;
pub mod scheduling;
pub mod storage;

pub use billing::BillingRates;
pub use error::{CycleError, Result, ScheduleError, StorageError};
pub use history::{History, HistoryPhase};
pub use orchestrator::{
    CycleOutcome, CycleReport, CycleSettings, Orchestrator, UsageSource, run_cycle_isolated,
};
pub use regression::{FitKind, ModelConfig, ModelFitter};
pub use scheduling::Schedule;
pub use storage::{
    HistoryStorage, JsonFileStorage, MemoryStorage, STORAGE_KEY, STORAGE_VERSION, StoredHistory,
    StoredRecord,
};

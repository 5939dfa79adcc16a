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

//! Persistence of the usage history.
//!
//! Storage is an opaque versioned document keyed by [`STORAGE_KEY`]. Every
//! call is a scoped operation; nothing is held open between a load and a save.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use crate::error::StorageError;

pub const STORAGE_KEY: &str = "gaswatch_history";
pub const STORAGE_VERSION: u32 = 1;

/// Default path for the history file.
pub const DEFAULT_HISTORY_PATH: &str = "./data/gaswatch_history.json";

/// One persisted day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub usage: f64,
    #[serde(default)]
    pub avg_temp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredHistory {
    pub key: String,
    pub version: u32,

    /// Date key to record; legacy documents may carry non-canonical keys
    #[serde(default)]
    pub records: BTreeMap<String, StoredRecord>,
}

impl Default for StoredHistory {
    fn default() -> Self {
        Self {
            key: STORAGE_KEY.to_owned(),
            version: STORAGE_VERSION,
            records: BTreeMap::new(),
        }
    }
}

impl StoredHistory {
    /// Reject documents written by a newer schema.
    pub fn check_version(self) -> Result<Self, StorageError> {
        if self.version > STORAGE_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: self.version,
                supported: STORAGE_VERSION,
            });
        }
        Ok(self)
    }
}

/// Load/save contract of the persistence collaborator.
pub trait HistoryStorage: Send + Sync {
    /// `None` when nothing has been stored yet.
    fn load(&self) -> Result<Option<StoredHistory>, StorageError>;

    fn save(&self, history: &StoredHistory) -> Result<(), StorageError>;
}

/// History kept in a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for JsonFileStorage {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_PATH)
    }
}

impl HistoryStorage for JsonFileStorage {
    fn load(&self) -> Result<Option<StoredHistory>, StorageError> {
        if !self.path.exists() {
            info!(
                "History file not found at {}, starting empty",
                self.path.display()
            );
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)?;
        let history: StoredHistory = serde_json::from_str(&contents)?;
        let history = history.check_version()?;

        debug!(
            "Loaded {} history records from {}",
            history.records.len(),
            self.path.display()
        );
        Ok(Some(history))
    }

    /// Atomic write: temp file + rename.
    fn save(&self, history: &StoredHistory) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(history)?;
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &self.path)?;

        debug!(
            "Saved {} history records to {}",
            history.records.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// In-memory storage for hosts that persist elsewhere, and for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    document: Mutex<Option<StoredHistory>>,
    saves: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: StoredHistory) -> Self {
        Self {
            document: Mutex::new(Some(document)),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn document(&self) -> Option<StoredHistory> {
        self.document.lock().clone()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl HistoryStorage for MemoryStorage {
    fn load(&self) -> Result<Option<StoredHistory>, StorageError> {
        self.document
            .lock()
            .clone()
            .map(StoredHistory::check_version)
            .transpose()
    }

    fn save(&self, history: &StoredHistory) -> Result<(), StorageError> {
        *self.document.lock() = Some(history.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//! Best-known results keyed by canonical signature.
//!
//! A record is created the first time a signature is optimized and replaced
//! only when a later search strictly improves its utilization. Records are
//! never removed.

use crate::types::{OptimizerError, PackingResult, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Default location of the history file, relative to the working directory
pub const DEFAULT_HISTORY_FILE: &str = "optimization_history.json";

/// A stored result and when it was recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(flatten)]
    pub result: PackingResult,
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(result: PackingResult) -> Self {
        Self {
            result,
            timestamp: Utc::now(),
        }
    }
}

/// Persistent map from signature to the best known result.
pub trait HistoryStore {
    /// Returns the record stored under `signature`, if any.
    fn lookup(&self, signature: &str) -> Option<HistoryRecord>;

    /// Stores `result` when no record exists for `signature` or when it has a
    /// strictly higher utilization. Returns whether a write happened.
    fn record_if_better(&mut self, signature: &str, result: &PackingResult) -> Result<bool>;

    /// Reloads state from the backing medium before an optimization call.
    fn refresh(&mut self) {}
}

/// Whether `candidate` should replace `existing`.
fn improves(existing: Option<&HistoryRecord>, candidate: &PackingResult) -> bool {
    match existing {
        None => true,
        Some(record) => candidate.utilization_percent > record.result.utilization_percent,
    }
}

/// History kept in memory only; used in tests and when persistence is off.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, HistoryRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &BTreeMap<String, HistoryRecord> {
        &self.records
    }
}

impl HistoryStore for MemoryStore {
    fn lookup(&self, signature: &str) -> Option<HistoryRecord> {
        self.records.get(signature).cloned()
    }

    fn record_if_better(&mut self, signature: &str, result: &PackingResult) -> Result<bool> {
        if !improves(self.records.get(signature), result) {
            return Ok(false);
        }
        self.records
            .insert(signature.to_string(), HistoryRecord::new(result.clone()));
        Ok(true)
    }
}

/// History backed by a pretty-printed JSON file.
///
/// Unreadable or corrupt files load as an empty history. Writes go to a
/// temporary file in the same directory which then replaces the original, so
/// a failed write leaves the previous file intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    records: BTreeMap<String, HistoryRecord>,
}

impl JsonFileStore {
    /// Opens the store at `path`, loading whatever the file currently holds.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = load_records(&path);
        Self { path, records }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &BTreeMap<String, HistoryRecord> {
        &self.records
    }

    /// Writes the current records back to the file.
    pub fn save(&self) -> Result<()> {
        self.persist(&self.records)
    }

    fn persist(&self, records: &BTreeMap<String, HistoryRecord>) -> Result<()> {
        write_records(&self.path, records).map_err(|source| OptimizerError::History {
            path: self.path.display().to_string(),
            source,
        })
    }
}

impl HistoryStore for JsonFileStore {
    fn lookup(&self, signature: &str) -> Option<HistoryRecord> {
        self.records.get(signature).cloned()
    }

    /// Re-reads the file before merging, so records written by other handles
    /// since the last refresh are kept.
    fn record_if_better(&mut self, signature: &str, result: &PackingResult) -> Result<bool> {
        let mut updated = load_records(&self.path);
        if !improves(updated.get(signature), result) {
            self.records = updated;
            return Ok(false);
        }

        updated.insert(signature.to_string(), HistoryRecord::new(result.clone()));
        self.persist(&updated)?;
        self.records = updated;
        Ok(true)
    }

    fn refresh(&mut self) {
        self.records = load_records(&self.path);
    }
}

fn load_records(path: &Path) -> BTreeMap<String, HistoryRecord> {
    if !path.exists() {
        debug!(path = %path.display(), "no history file yet");
        return BTreeMap::new();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cannot read history, starting empty");
            return BTreeMap::new();
        }
    };

    match serde_json::from_str(&content) {
        Ok(records) => records,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "corrupt history, starting empty");
            BTreeMap::new()
        }
    }
}

fn write_records(path: &Path, records: &BTreeMap<String, HistoryRecord>) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, records)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sheet;

    fn result_with(utilization_percent: f64) -> PackingResult {
        PackingResult {
            sheet_count: 1,
            utilization_percent,
            sheets: vec![Sheet {
                used_width: 1000,
                leftover: 200,
                cuts: vec![500, 500],
            }],
        }
    }

    #[test]
    fn test_first_record_is_always_written() {
        let mut store = MemoryStore::new();
        assert!(store.lookup("a").is_none());
        assert!(store.record_if_better("a", &result_with(10.0)).unwrap());
        assert_eq!(store.lookup("a").unwrap().result.utilization_percent, 10.0);
    }

    #[test]
    fn test_only_strict_improvements_replace() {
        let mut store = MemoryStore::new();
        store.record_if_better("a", &result_with(80.0)).unwrap();

        assert!(!store.record_if_better("a", &result_with(80.0)).unwrap());
        assert!(!store.record_if_better("a", &result_with(70.0)).unwrap());
        assert!(store.record_if_better("a", &result_with(90.0)).unwrap());
        assert_eq!(store.lookup("a").unwrap().result.utilization_percent, 90.0);
    }

    #[test]
    fn test_stored_utilization_never_decreases() {
        let mut store = MemoryStore::new();
        let mut last = f64::MIN;
        for u in [50.0, 75.0, 60.0, 75.0, 99.5, 20.0, 99.0] {
            store.record_if_better("sig", &result_with(u)).unwrap();
            let stored = store.lookup("sig").unwrap().result.utilization_percent;
            assert!(stored >= last);
            last = stored;
        }
        assert_eq!(last, 99.5);
    }

    #[test]
    fn test_file_store_persists_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut store = JsonFileStore::open(&path);
        assert!(store.records().is_empty());
        assert!(store.record_if_better("sig", &result_with(95.0)).unwrap());

        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.lookup("sig"), store.lookup("sig"));
    }

    #[test]
    fn test_file_store_round_trips_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut store = JsonFileStore::open(&path);
        store.record_if_better("one", &result_with(58.333333333333336)).unwrap();
        store.record_if_better("two", &result_with(100.0)).unwrap();
        let before: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        JsonFileStore::open(&path).save().unwrap();
        let after: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn test_corrupt_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut store = JsonFileStore::open(&path);
        assert!(store.records().is_empty());
        assert!(store.record_if_better("sig", &result_with(50.0)).unwrap());
        assert!(JsonFileStore::open(&path).lookup("sig").is_some());
    }

    #[test]
    fn test_write_failure_is_reported_and_keeps_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("history.json");

        let mut store = JsonFileStore::open(&path);
        let err = store.record_if_better("sig", &result_with(50.0)).unwrap_err();
        assert!(matches!(err, OptimizerError::History { .. }));
        assert!(store.lookup("sig").is_none());
    }

    #[test]
    fn test_refresh_picks_up_external_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut reader = JsonFileStore::open(&path);
        let mut writer = JsonFileStore::open(&path);
        writer.record_if_better("sig", &result_with(88.0)).unwrap();

        assert!(reader.lookup("sig").is_none());
        reader.refresh();
        assert_eq!(reader.lookup("sig").unwrap().result.utilization_percent, 88.0);
    }

    #[test]
    fn test_stale_handle_keeps_other_writers_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut first = JsonFileStore::open(&path);
        let mut second = JsonFileStore::open(&path);
        first.refresh();
        second.refresh();

        assert!(second.record_if_better("sig_b", &result_with(70.0)).unwrap());
        assert!(first.record_if_better("sig_a", &result_with(60.0)).unwrap());

        let reopened = JsonFileStore::open(&path);
        assert_eq!(
            reopened.records().keys().collect::<Vec<_>>(),
            vec!["sig_a", "sig_b"]
        );
        assert_eq!(first.lookup("sig_b"), reopened.lookup("sig_b"));
    }

    #[test]
    fn test_stale_handle_does_not_overwrite_better_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut stale = JsonFileStore::open(&path);
        let mut fresh = JsonFileStore::open(&path);
        fresh.record_if_better("sig", &result_with(95.0)).unwrap();

        assert!(!stale.record_if_better("sig", &result_with(80.0)).unwrap());
        assert_eq!(
            JsonFileStore::open(&path)
                .lookup("sig")
                .unwrap()
                .result
                .utilization_percent,
            95.0
        );
        assert_eq!(stale.lookup("sig").unwrap().result.utilization_percent, 95.0);
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = HistoryRecord::new(result_with(75.0));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["sheet_count"], 1);
        assert_eq!(value["utilization_percent"], 75.0);
        assert_eq!(value["sheets"][0]["cuts"][1], 500);
        assert!(value["timestamp"].is_string());
    }
}

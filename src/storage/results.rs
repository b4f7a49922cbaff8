//! Append-only result tables for raw and classified telemetry.
//!
//! Five trees: `raw_results` plus the four classification outputs. Nothing is
//! ever replaced — dedup happens before append. Classified rows are keyed by
//! a SHA-256 of their serialized form so full-row equality dedup is a single
//! `contains_key`; the last-IPL index is keyed by its natural
//! `(sysname, last_ipl)` pair.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

use super::StoreError;
use crate::types::{DoneRecord, LastIplRecord, RawIplRecord};

/// Store of raw and classified IPL results.
#[derive(Clone)]
pub struct ResultStore {
    db: sled::Db,
    raw: sled::Tree,
    done: sled::Tree,
    fail: sled::Tree,
    garbage: sled::Tree,
    last_ipl: sled::Tree,
}

impl ResultStore {
    /// Open or create the result store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self {
            raw: db.open_tree("raw_results")?,
            done: db.open_tree("results_done")?,
            fail: db.open_tree("results_fail")?,
            garbage: db.open_tree("results_garb")?,
            last_ipl: db.open_tree("results_last_ipl")?,
            db,
        })
    }

    /// Distinct `log_dataset` identifiers already ingested — the dedup set
    /// consulted by the ingestion gate.
    pub fn ingested_datasets(&self) -> Result<HashSet<String>, StoreError> {
        let mut datasets = HashSet::new();
        for item in self.raw.iter() {
            let (_key, value) = item?;
            let record: RawIplRecord = serde_json::from_slice(&value)?;
            datasets.insert(record.log_dataset);
        }
        Ok(datasets)
    }

    /// Append raw records wholesale. Keys are monotonically increasing ids,
    /// so iteration preserves ingestion order.
    pub fn append_raw(&self, records: &[RawIplRecord]) -> Result<(), StoreError> {
        for record in records {
            let key = self.db.generate_id()?.to_be_bytes();
            self.raw.insert(key, serde_json::to_vec(record)?)?;
        }
        self.raw.flush()?;
        Ok(())
    }

    pub fn raw_records(&self) -> Result<Vec<RawIplRecord>, StoreError> {
        let mut records = Vec::new();
        for item in self.raw.iter() {
            let (_key, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    /// Append a Done record unless an identical row is already stored.
    /// Returns true when the record was actually inserted.
    pub fn append_done(&self, record: &DoneRecord) -> Result<bool, StoreError> {
        Self::append_hashed(&self.done, record)
    }

    /// Append a Fail row (full raw shape) with full-row dedup.
    pub fn append_fail(&self, record: &RawIplRecord) -> Result<bool, StoreError> {
        Self::append_hashed(&self.fail, record)
    }

    /// Append a Garbage row (full raw shape) with full-row dedup.
    pub fn append_garbage(&self, record: &RawIplRecord) -> Result<bool, StoreError> {
        Self::append_hashed(&self.garbage, record)
    }

    /// Append a last-IPL entry, deduplicated by the `(sysname, last_ipl)` pair.
    pub fn append_last_ipl(&self, record: &LastIplRecord) -> Result<bool, StoreError> {
        let key = format!("{}|{}", record.sysname, record.last_ipl);
        if self.last_ipl.contains_key(key.as_bytes())? {
            return Ok(false);
        }
        self.last_ipl
            .insert(key.as_bytes(), serde_json::to_vec(record)?)?;
        Ok(true)
    }

    fn append_hashed<T: serde::Serialize>(
        tree: &sled::Tree,
        record: &T,
    ) -> Result<bool, StoreError> {
        let value = serde_json::to_vec(record)?;
        let key = Sha256::digest(&value);
        if tree.contains_key(key)? {
            return Ok(false);
        }
        tree.insert(key, value)?;
        Ok(true)
    }

    /// Flush every tree. Called once per ingestion pass rather than per row.
    pub fn flush(&self) -> Result<(), StoreError> {
        for tree in [&self.done, &self.fail, &self.garbage, &self.last_ipl] {
            tree.flush()?;
        }
        Ok(())
    }

    pub fn done_records(&self) -> Result<Vec<DoneRecord>, StoreError> {
        Self::collect(&self.done)
    }

    pub fn fail_records(&self) -> Result<Vec<RawIplRecord>, StoreError> {
        Self::collect(&self.fail)
    }

    pub fn garbage_records(&self) -> Result<Vec<RawIplRecord>, StoreError> {
        Self::collect(&self.garbage)
    }

    pub fn last_ipl_records(&self) -> Result<Vec<LastIplRecord>, StoreError> {
        Self::collect(&self.last_ipl)
    }

    fn collect<T: serde::de::DeserializeOwned>(tree: &sled::Tree) -> Result<Vec<T>, StoreError> {
        let mut records = Vec::new();
        for item in tree.iter() {
            let (_key, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    pub fn raw_count(&self) -> usize {
        self.raw.len()
    }

    pub fn done_count(&self) -> usize {
        self.done.len()
    }

    pub fn fail_count(&self) -> usize {
        self.fail.len()
    }

    pub fn garbage_count(&self) -> usize {
        self.garbage.len()
    }

    pub fn last_ipl_count(&self) -> usize {
        self.last_ipl.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(sysname: &str, dataset: &str) -> RawIplRecord {
        RawIplRecord {
            sysname: sysname.to_string(),
            log_dataset: dataset.to_string(),
            shutdown_begin: "2024-01-01 10:00:00".to_string(),
            shutdown_end: "2024-01-01 10:05:30".to_string(),
            ipl_begin: "2024-01-01 10:10:00".to_string(),
            ipl_end: "2024-01-01 10:20:00".to_string(),
            pre_ipl: String::new(),
            pos_ipl: String::new(),
            last_ipl: "2024-01-01 10:20:00".to_string(),
        }
    }

    fn open_store() -> (tempfile::TempDir, ResultStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ResultStore::open(dir.path().join("results")).expect("open");
        (dir, store)
    }

    #[test]
    fn raw_append_tracks_dataset_identifiers() {
        let (_dir, store) = open_store();
        store
            .append_raw(&[raw("SYSA", "SYSA.LOG.D240101"), raw("SYSB", "SYSB.LOG.D240101")])
            .expect("append");

        let datasets = store.ingested_datasets().expect("datasets");
        assert!(datasets.contains("SYSA.LOG.D240101"));
        assert!(datasets.contains("SYSB.LOG.D240101"));
        assert_eq!(store.raw_count(), 2);
    }

    #[test]
    fn classified_append_is_idempotent() {
        let (_dir, store) = open_store();
        let record = raw("SYSA", "SYSA.LOG.D240101");

        assert!(store.append_fail(&record).expect("append"));
        assert!(!store.append_fail(&record).expect("append"));
        assert_eq!(store.fail_count(), 1);

        // A different row still appends.
        assert!(store.append_fail(&raw("SYSB", "SYSB.LOG")).expect("append"));
        assert_eq!(store.fail_count(), 2);
    }

    #[test]
    fn last_ipl_dedup_keyed_by_sysname_and_timestamp() {
        let (_dir, store) = open_store();
        let record = LastIplRecord {
            sysname: "SYSA".to_string(),
            last_ipl: "2024-01-01 10:20:00".to_string(),
        };

        assert!(store.append_last_ipl(&record).expect("append"));
        assert!(!store.append_last_ipl(&record).expect("append"));

        let other = LastIplRecord {
            sysname: "SYSA".to_string(),
            last_ipl: "2024-02-01 08:00:00".to_string(),
        };
        assert!(store.append_last_ipl(&other).expect("append"));
        assert_eq!(store.last_ipl_count(), 2);
    }
}

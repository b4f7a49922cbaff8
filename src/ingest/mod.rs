//! Telemetry ingestion — CSV discovery, the exactly-once gate, and the
//! classification pass.
//!
//! Discovery walks the results root for `*.CSV` artifacts carrying the
//! "resume" marker. A discovered file is appended to the raw store wholesale
//! only when it is larger than the viability threshold and at least one of
//! its `log_dataset` values has never been ingested — file granularity, not
//! row granularity. Classification then runs over the raw rows of every
//! newly-touched system and appends into the Done/Fail/Garbage and last-IPL
//! tables, deduplicated before every append.

pub mod classify;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config;
use crate::config::defaults::{CSV_SUFFIX, RESUME_MARKER};
use crate::storage::{ResultStore, StoreError};
use crate::types::RawIplRecord;

use classify::{classify, last_ipl_of, Classification};

/// Ingestion errors. Malformed rows are not errors — only I/O and storage
/// failures surface here.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Column layout of a telemetry CSV, resolved from its header row.
struct ColumnMap {
    indices: [Option<usize>; 9],
}

const COLUMNS: [&str; 9] = [
    "sysname",
    "log_dataset",
    "shutdown_begin",
    "shutdown_end",
    "ipl_begin",
    "ipl_end",
    "pre_ipl",
    "pos_ipl",
    "last_ipl",
];

impl ColumnMap {
    fn from_header(header: &str) -> Self {
        let names: Vec<&str> = header.split(';').map(str::trim).collect();
        let mut indices = [None; 9];
        for (slot, column) in COLUMNS.iter().enumerate() {
            indices[slot] = names.iter().position(|name| name == column);
        }
        Self { indices }
    }

    fn field(&self, fields: &[&str], slot: usize) -> String {
        self.indices[slot]
            .and_then(|i| fields.get(i))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    }

    fn record(&self, line: &str) -> RawIplRecord {
        let fields: Vec<&str> = line.split(';').collect();
        RawIplRecord {
            sysname: self.field(&fields, 0),
            log_dataset: self.field(&fields, 1),
            shutdown_begin: self.field(&fields, 2),
            shutdown_end: self.field(&fields, 3),
            ipl_begin: self.field(&fields, 4),
            ipl_end: self.field(&fields, 5),
            pre_ipl: self.field(&fields, 6),
            pos_ipl: self.field(&fields, 7),
            last_ipl: self.field(&fields, 8),
        }
    }
}

/// Recursively scan `root` for result CSVs: name ends with `.CSV` and
/// carries the resume marker. Returns filename → path, one entry per
/// distinct filename (a later duplicate name replaces the earlier one).
pub fn discover_csv_files(root: &Path) -> BTreeMap<String, PathBuf> {
    let mut found = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(CSV_SUFFIX) && name.contains(RESUME_MARKER) {
                found.insert(name.to_string(), path);
            }
        }
    }
    found
}

/// Parse one telemetry CSV into raw rows. Missing columns come back as empty
/// strings and are sorted out by classification.
fn parse_csv(path: &Path) -> Result<Vec<RawIplRecord>, IngestError> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();

    let Some(header) = lines.next().transpose()? else {
        return Ok(Vec::new());
    };
    let columns = ColumnMap::from_header(&header);

    let mut records = Vec::new();
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(columns.record(&line));
    }
    Ok(records)
}

/// Discovers, gates, ingests and classifies telemetry CSVs.
pub struct IngestionClassifier {
    store: Arc<ResultStore>,
    results_root: PathBuf,
}

impl IngestionClassifier {
    pub fn new(store: Arc<ResultStore>, results_root: PathBuf) -> Self {
        Self {
            store,
            results_root,
        }
    }

    /// With the results root taken from the engine config.
    pub fn from_config(store: Arc<ResultStore>) -> Self {
        Self::new(store, config::get().paths.results_root.clone())
    }

    /// Run one full ingestion-and-classification pass.
    ///
    /// Returns the distinct system names newly touched, so callers refresh
    /// only affected systems instead of rescanning everything.
    pub fn run(&self) -> Result<Vec<String>, IngestError> {
        let min_bytes = config::get().ingest.min_viable_bytes;
        let mut ingested = self.store.ingested_datasets()?;
        let mut touched: BTreeSet<String> = BTreeSet::new();

        for (name, path) in discover_csv_files(&self.results_root) {
            let size = fs::metadata(&path)?.len();
            if size <= min_bytes {
                debug!(file = %name, size = size, "Below viability threshold — skipped");
                continue;
            }

            let rows = match parse_csv(&path) {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(file = %name, error = %e, "Unreadable CSV — skipped");
                    continue;
                }
            };
            if rows.is_empty() {
                continue;
            }

            let datasets: HashSet<&str> = rows.iter().map(|r| r.log_dataset.as_str()).collect();
            if datasets.iter().all(|d| ingested.contains(*d)) {
                debug!(file = %name, "All datasets already ingested — skipped");
                continue;
            }

            self.store.append_raw(&rows)?;
            ingested.extend(datasets.iter().map(|d| (*d).to_string()));
            touched.extend(rows.iter().map(|r| r.sysname.clone()));
            info!(file = %name, rows = rows.len(), "Ingested telemetry file");
        }

        if !touched.is_empty() {
            self.classify_systems(&touched)?;
        }
        Ok(touched.into_iter().collect())
    }

    /// Classify every raw row belonging to the given systems. Appends are
    /// deduplicated, so re-classifying a system is harmless.
    fn classify_systems(&self, sysnames: &BTreeSet<String>) -> Result<(), IngestError> {
        let mut done = 0usize;
        let mut fail = 0usize;
        let mut garbage = 0usize;

        for row in self.store.raw_records()? {
            if !sysnames.contains(&row.sysname) {
                continue;
            }
            match classify(&row) {
                Classification::Done(record) => {
                    if self.store.append_done(&record)? {
                        done += 1;
                    }
                }
                Classification::Fail(record) => {
                    if self.store.append_fail(&record)? {
                        fail += 1;
                    }
                }
                Classification::Garbage(record) => {
                    if self.store.append_garbage(&record)? {
                        garbage += 1;
                    }
                }
            }
            if let Some(last) = last_ipl_of(&row) {
                self.store.append_last_ipl(&last)?;
            }
        }
        self.store.flush()?;

        info!(
            systems = sysnames.len(),
            done = done,
            fail = fail,
            garbage = garbage,
            "Classification pass complete"
        );
        Ok(())
    }
}

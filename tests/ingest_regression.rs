//! Ingestion and classification regression tests
//!
//! Drive the full discovery → gate → raw append → classification pass over
//! real files in a temp results tree, with a fresh result store per test.

use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use zipld::config::{self, ZipldConfig};
use zipld::ingest::IngestionClassifier;
use zipld::storage::ResultStore;

static CONFIG: OnceLock<()> = OnceLock::new();

fn init_config() {
    CONFIG.get_or_init(|| config::init(ZipldConfig::default()));
}

const HEADER: &str =
    "sysname;log_dataset;shutdown_begin;shutdown_end;ipl_begin;ipl_end;pre_ipl;pos_ipl;last_ipl";

/// One complete row: classifies Done and feeds the last-IPL index.
fn done_row(sysname: &str, dataset: &str) -> String {
    format!(
        "{sysname};{dataset};2024-01-01 10:00:00;2024-01-01 10:05:30;\
         2024-01-01 10:10:00;2024-01-01 10:30:00;data;data;2024-01-01 10:30:00"
    )
}

/// A row with partial timestamps: classifies Fail.
fn fail_row(sysname: &str, dataset: &str) -> String {
    format!("{sysname};{dataset};2024-01-01 10:00:00;;;;data;data;")
}

/// A row with no usable timestamps: classifies Garbage.
fn garbage_row(sysname: &str, dataset: &str) -> String {
    format!("{sysname};{dataset};;;;;data;data;")
}

fn write_csv(dir: &Path, name: &str, rows: &[String]) {
    fs::create_dir_all(dir).expect("mkdir");
    let mut body = String::from(HEADER);
    for row in rows {
        body.push('\n');
        body.push_str(row);
    }
    // Pad over the viability threshold; real artifacts carry trailing
    // whitespace from the awk stage anyway.
    while body.len() <= 205 {
        body.push('\n');
    }
    fs::write(dir.join(name), body).expect("write csv");
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: std::path::PathBuf,
    store: Arc<ResultStore>,
    classifier: IngestionClassifier,
}

fn fixture() -> Fixture {
    init_config();
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("results");
    fs::create_dir_all(&root).expect("mkdir");
    let store = Arc::new(ResultStore::open(dir.path().join("store")).expect("open store"));
    let classifier = IngestionClassifier::new(store.clone(), root.clone());
    Fixture {
        _dir: dir,
        root,
        store,
        classifier,
    }
}

#[test]
fn ingests_and_classifies_new_telemetry() {
    let fx = fixture();
    write_csv(
        &fx.root.join("sysa"),
        "SYSA.resume.CSV",
        &[
            done_row("SYSA", "SYSA.LOG.D240101"),
            fail_row("SYSA", "SYSA.LOG.D240102"),
            garbage_row("SYSA", "SYSA.LOG.D240103"),
        ],
    );

    let touched = fx.classifier.run().expect("ingest");
    assert_eq!(touched, vec!["SYSA".to_string()]);

    assert_eq!(fx.store.raw_count(), 3);
    assert_eq!(fx.store.done_count(), 1);
    assert_eq!(fx.store.fail_count(), 1);
    assert_eq!(fx.store.garbage_count(), 1);
    assert_eq!(fx.store.last_ipl_count(), 1);

    let done = fx.store.done_records().expect("done records");
    assert_eq!(done[0].shutdown_duration, "00:05:30");
    assert_eq!(done[0].total_duration, "00:30:00");
}

#[test]
fn reingesting_the_same_file_changes_nothing() {
    let fx = fixture();
    write_csv(
        &fx.root.join("sysa"),
        "SYSA.resume.CSV",
        &[done_row("SYSA", "SYSA.LOG.D240101")],
    );

    let first = fx.classifier.run().expect("first pass");
    assert_eq!(first, vec!["SYSA".to_string()]);
    let raw = fx.store.raw_count();
    let done = fx.store.done_count();
    let last = fx.store.last_ipl_count();

    let second = fx.classifier.run().expect("second pass");
    assert!(second.is_empty(), "no system should be newly touched");
    assert_eq!(fx.store.raw_count(), raw);
    assert_eq!(fx.store.done_count(), done);
    assert_eq!(fx.store.last_ipl_count(), last);
}

#[test]
fn undersized_files_are_not_viable() {
    let fx = fixture();
    let dir = fx.root.join("sysa");
    fs::create_dir_all(&dir).expect("mkdir");
    // Header plus one truncated row, below the viability threshold.
    fs::write(dir.join("SYSA.resume.CSV"), format!("{HEADER}\nSYSA;X")).expect("write");

    let touched = fx.classifier.run().expect("ingest");
    assert!(touched.is_empty());
    assert_eq!(fx.store.raw_count(), 0);
}

#[test]
fn files_without_the_resume_marker_are_ignored() {
    let fx = fixture();
    write_csv(
        &fx.root.join("sysa"),
        "SYSA.full.CSV",
        &[done_row("SYSA", "SYSA.LOG.D240101")],
    );

    let touched = fx.classifier.run().expect("ingest");
    assert!(touched.is_empty());
    assert_eq!(fx.store.raw_count(), 0);
}

#[test]
fn a_file_with_one_unseen_dataset_is_appended_wholesale() {
    let fx = fixture();
    write_csv(
        &fx.root.join("sysa"),
        "SYSA.resume.CSV",
        &[done_row("SYSA", "SYSA.LOG.D240101")],
    );
    fx.classifier.run().expect("first pass");
    assert_eq!(fx.store.raw_count(), 1);

    // Second artifact mixes an already-seen dataset with a new one: the
    // whole file is appended (file granularity, not row granularity).
    write_csv(
        &fx.root.join("sysa"),
        "SYSA.resume2.CSV",
        &[
            done_row("SYSA", "SYSA.LOG.D240101"),
            done_row("SYSA", "SYSA.LOG.D240105"),
        ],
    );
    let touched = fx.classifier.run().expect("second pass");
    assert_eq!(touched, vec!["SYSA".to_string()]);
    assert_eq!(fx.store.raw_count(), 3);

    // Classified stores stay deduplicated even though the raw rows repeat.
    assert_eq!(fx.store.done_count(), 2);
    assert_eq!(fx.store.last_ipl_count(), 1);
}

#[test]
fn touched_systems_cover_every_ingested_file() {
    let fx = fixture();
    write_csv(
        &fx.root.join("sysa"),
        "SYSA.resume.CSV",
        &[done_row("SYSA", "SYSA.LOG.D240101")],
    );
    write_csv(
        &fx.root.join("sysb"),
        "SYSB.resume.CSV",
        &[fail_row("SYSB", "SYSB.LOG.D240101")],
    );

    let touched = fx.classifier.run().expect("ingest");
    assert_eq!(touched, vec!["SYSA".to_string(), "SYSB".to_string()]);
    assert_eq!(fx.store.done_count(), 1);
    assert_eq!(fx.store.fail_count(), 1);
}

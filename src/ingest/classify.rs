//! Row classification and duration arithmetic.
//!
//! Malformed timestamps never raise here — they route the row into the Fail
//! or Garbage bucket. The partition over valid-timestamp counts is total and
//! disjoint: 4 valid → Done, 1–3 valid → Fail, 0 valid → Garbage.

use chrono::NaiveDateTime;

use crate::config::defaults::TIMESTAMP_FORMAT;
use crate::types::{DoneRecord, LastIplRecord, RawIplRecord};

/// Classification outcome for one raw row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Done(Box<DoneRecord>),
    Fail(RawIplRecord),
    Garbage(RawIplRecord),
}

pub(crate) fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).ok()
}

pub(crate) fn is_timestamp(value: &str) -> bool {
    parse_timestamp(value).is_some()
}

/// Format a span in seconds as `HH:MM:SS`, accumulating whole 24 h blocks
/// into the hour count (a 30-hour span renders as `30:00:00`, never
/// `06:00:00`). Negative spans clamp to zero.
pub(crate) fn format_duration(total_secs: i64) -> String {
    let secs = total_secs.max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Span between two timestamps as `HH:MM:SS`.
fn duration_between(begin: NaiveDateTime, end: NaiveDateTime) -> String {
    format_duration((end - begin).num_seconds())
}

/// Render the IPL date of a Done record ("Jan 12, 2023").
fn ipl_date(ts: NaiveDateTime) -> String {
    ts.format("%b %d, %Y").to_string()
}

/// Classify one raw row by its four core timestamps.
pub fn classify(row: &RawIplRecord) -> Classification {
    let parsed = [
        parse_timestamp(&row.shutdown_begin),
        parse_timestamp(&row.shutdown_end),
        parse_timestamp(&row.ipl_begin),
        parse_timestamp(&row.ipl_end),
    ];
    let valid = parsed.iter().filter(|p| p.is_some()).count();

    match (valid, parsed) {
        (4, [Some(shutdown_begin), Some(shutdown_end), Some(ipl_begin), Some(ipl_end)]) => {
            Classification::Done(Box::new(DoneRecord {
                sysname: row.sysname.clone(),
                ipl_date: ipl_date(shutdown_begin),
                log_dataset: row.log_dataset.clone(),
                shutdown_begin: row.shutdown_begin.clone(),
                shutdown_end: row.shutdown_end.clone(),
                ipl_begin: row.ipl_begin.clone(),
                ipl_end: row.ipl_end.clone(),
                pre_ipl: row.pre_ipl.clone(),
                pos_ipl: row.pos_ipl.clone(),
                shutdown_duration: duration_between(shutdown_begin, shutdown_end),
                poweroff_duration: duration_between(shutdown_end, ipl_begin),
                load_duration: duration_between(ipl_begin, ipl_end),
                total_duration: duration_between(shutdown_begin, ipl_end),
            }))
        }
        (0, _) => Classification::Garbage(row.clone()),
        _ => Classification::Fail(row.clone()),
    }
}

/// Derive the last-IPL index entry, independently of the classification
/// bucket: a row may contribute to both.
pub fn last_ipl_of(row: &RawIplRecord) -> Option<LastIplRecord> {
    is_timestamp(&row.last_ipl).then(|| LastIplRecord {
        sysname: row.sysname.clone(),
        last_ipl: row.last_ipl.clone(),
    })
}

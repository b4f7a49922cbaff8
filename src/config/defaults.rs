//! System-wide default constants.
//!
//! Centralises magic numbers shared across subsystems. Grouped by subsystem
//! for easy discovery.

// ============================================================================
// Deployment
// ============================================================================

/// Worker-pool cap for host fan-out. Work is I/O-bound on SSH round-trips,
/// so this is the primary scaling lever.
pub const DEFAULT_WORKER_CAP: usize = 60;

/// Percent reported in the initial all-waiting progress snapshot.
pub const INITIAL_PROGRESS_PERCENT: f64 = 10.0;

/// Root of the per-host remote workspace. Host short names are appended.
pub const DEFAULT_REMOTE_TMP_ROOT: &str = "/tmp/ipl_analysis/";

/// Payload files pushed into the remote workspace, in upload order.
pub const PAYLOAD_FILES: [&str; 5] = [
    "ipld_calc.awk",
    "ipld_parsing.awk",
    "patterns",
    "main.sh",
    "methods.sh",
];

// ============================================================================
// Preflight
// ============================================================================

/// Maximum /tmp usage (percent) accepted by the dry-run space check.
pub const DEFAULT_TMP_SPACE_MAX_PERCENT: u32 = 60;

/// Minimum catalog entry count proving dataset access.
pub const DATASET_MIN_COUNT: i64 = 1;

// ============================================================================
// Scheduler
// ============================================================================

/// Tick-loop interval (seconds).
pub const SCHEDULER_TICK_SECS: u64 = 1;

// ============================================================================
// Ingestion
// ============================================================================

/// Minimum CSV size (bytes) considered viable for ingestion. Anything
/// smaller is a header-only or truncated artifact.
pub const DEFAULT_MIN_VIABLE_BYTES: u64 = 205;

/// Filename marker identifying result CSVs produced by the analysis scripts.
pub const RESUME_MARKER: &str = "resume";

/// Extension of telemetry artifacts, as produced on the remote side.
pub const CSV_SUFFIX: &str = ".CSV";

/// Timestamp format of every telemetry field.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// Remote transport
// ============================================================================

/// SSH connect timeout (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// SSH port used for every LPAR.
pub const SSH_PORT: u16 = 22;

// ============================================================================
// Network policy
// ============================================================================

/// HTTP timeout for network-policy API requests (seconds).
pub const POLICY_HTTP_TIMEOUT_SECS: u64 = 10;

//! Process Configuration Module
//!
//! Provides engine configuration loaded from TOML files, replacing hardcoded
//! paths, thresholds and pool sizes with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `ZIPLD_CONFIG` environment variable (path to TOML file)
//! 2. `zipld.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(ZipldConfig::load());
//!
//! // Anywhere in the codebase:
//! let cap = config::get().deploy.worker_cap;
//! ```

mod engine_config;
pub mod defaults;

pub use engine_config::*;

use std::sync::OnceLock;

/// Global engine configuration, initialized once at startup.
static ENGINE_CONFIG: OnceLock<ZipldConfig> = OnceLock::new();

/// Initialize the global configuration.
///
/// Must be called exactly once before any calls to `get()`.
pub fn init(config: ZipldConfig) {
    if ENGINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global configuration.
///
/// Panics if `init()` has not been called. This is by design — a missing
/// config is a fatal startup error, not a recoverable condition.
pub fn get() -> &'static ZipldConfig {
    ENGINE_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

/// Check whether the config has been initialized.
///
/// Useful for tests and optional config paths.
pub fn is_initialized() -> bool {
    ENGINE_CONFIG.get().is_some()
}

//! Centralized path configuration for kiln.
//!
//! All data paths should go through this module so the CLI and embedders agree
//! on where builder state lives.

use std::path::PathBuf;

/// Default engine endpoint when neither `KILN_HOST` nor config names one.
pub const DEFAULT_ENDPOINT: &str = "unix:///run/buildkit/buildkitd.sock";

/// Get the kiln data directory.
///
/// Resolution order:
/// 1. `KILN_DATA_DIR` environment variable
/// 2. `~/.kiln`
/// 3. `.kiln` in the working directory when no home directory is known
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("KILN_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir().map(|h| h.join(".kiln")).unwrap_or_else(|| PathBuf::from(".kiln"))
}

/// Get the configuration directory (`KILN_CONFIG_DIR`, else the data directory).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("KILN_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    data_dir()
}

/// Get the builder instance store root.
pub fn store_dir() -> PathBuf {
    data_dir().join("instances")
}

/// Get the root of per-node driver state.
pub fn state_dir() -> PathBuf {
    data_dir().join("state")
}

/// Engine endpoint from `KILN_HOST`, if set and non-empty.
pub fn host_endpoint() -> Option<String> {
    std::env::var("KILN_HOST").ok().filter(|h| !h.is_empty())
}

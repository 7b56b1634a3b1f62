//! Purpose: Shared base-directory and private-data path derivation.
//! Exports: `default_base_dir`, `private_data_root`, `prefs_path`, `DataSuffixError`.
//! Role: Keep library defaults and CLI path semantics aligned from one source.
//! Invariants: Default base directory remains `~/.embedboot`.
//! Invariants: Private data lives in `<base>/app_<suffix>`; the version store sits beside it.
//! Invariants: Data suffixes must not contain path separators or be empty.

use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_SUFFIX: &str = "embedboot";
const PREFS_FILE: &str = "prefs.json";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DataSuffixError {
    Empty,
    ContainsPathSeparator,
}

pub fn default_base_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".embedboot")
}

pub fn private_data_root(base: &Path, suffix: &str) -> Result<PathBuf, DataSuffixError> {
    if suffix.is_empty() {
        return Err(DataSuffixError::Empty);
    }
    if suffix.contains('/') || suffix.contains(std::path::MAIN_SEPARATOR) {
        return Err(DataSuffixError::ContainsPathSeparator);
    }
    Ok(base.join(format!("app_{suffix}")))
}

/// Kept outside the private data root so a downgrade purge cannot erase it.
pub fn prefs_path(base: &Path) -> PathBuf {
    base.join(PREFS_FILE)
}

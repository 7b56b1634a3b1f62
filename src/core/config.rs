// Static inputs to one-time setup: package identity, running version, and paths.
use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind};
use crate::core::identity::PackageSpec;
use crate::core::version_guard::LAST_VERSION_KEY;
use crate::data_paths::{
    DEFAULT_DATA_SUFFIX, DataSuffixError, default_base_dir, prefs_path, private_data_root,
};

#[derive(Clone, Debug)]
pub struct BootConfig {
    pub package: PackageSpec,
    pub version_code: u32,
    pub data_root: PathBuf,
    pub prefs_path: PathBuf,
    pub version_key: String,
}

impl BootConfig {
    pub fn new(package: PackageSpec, version_code: u32) -> Self {
        let base = default_base_dir();
        Self {
            package,
            version_code,
            data_root: base.join(format!("app_{DEFAULT_DATA_SUFFIX}")),
            prefs_path: prefs_path(&base),
            version_key: LAST_VERSION_KEY.to_string(),
        }
    }

    /// Places private data at `<base>/app_<suffix>` and the store at `<base>/prefs.json`.
    pub fn with_base_dir(mut self, base: &Path, suffix: &str) -> Result<Self, Error> {
        self.data_root = private_data_root(base, suffix).map_err(map_suffix_error)?;
        self.prefs_path = prefs_path(base);
        Ok(self)
    }

    pub fn with_data_root(mut self, data_root: impl Into<PathBuf>) -> Self {
        self.data_root = data_root.into();
        self
    }

    pub fn with_prefs_path(mut self, prefs_path: impl Into<PathBuf>) -> Self {
        self.prefs_path = prefs_path.into();
        self
    }

    pub fn with_version_key(mut self, key: impl Into<String>) -> Self {
        self.version_key = key.into();
        self
    }

    pub fn current_version_code(&self) -> u32 {
        self.version_code
    }
}

fn map_suffix_error(err: DataSuffixError) -> Error {
    match err {
        DataSuffixError::Empty => {
            Error::new(ErrorKind::Usage).with_message("data directory suffix must not be empty")
        }
        DataSuffixError::ContainsPathSeparator => Error::new(ErrorKind::Usage)
            .with_message("data directory suffix must not contain path separators"),
    }
}

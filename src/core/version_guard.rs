//! Purpose: Detect a library downgrade since the last run and wipe stale private data.
//! Exports: `branch`, `VersionRecord`, `VersionAction`, `VersionOutcome`, `reconcile`, `apply`.
//! Role: Decision is a pure function; `apply` performs the deletes and the store write.
//! Invariants: Only a strictly smaller branch purges; any version change is persisted.
//! Invariants: Deletion and store failures are logged and reported, never fatal.
//!
//! Version codes are packed as `BBBBPPPAX`: a monotonically increasing
//! four-digit branch, a three-digit patch, an architecture digit, and a
//! variant digit. Only the branch is compared.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::purge::{FileSystem, delete_contents};
use crate::core::store::VersionStore;

pub const BRANCH_SCALE: u32 = 100_000;
pub const LAST_VERSION_KEY: &str = "last_version_code_used";

pub fn branch(version_code: u32) -> u32 {
    version_code / BRANCH_SCALE
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct VersionRecord {
    pub last_version_code: u32,
}

impl VersionRecord {
    /// A missing entry reads as version 0, which never triggers a purge.
    pub fn load(store: &dyn VersionStore, key: &str) -> Self {
        Self {
            last_version_code: store.get_int(key).unwrap_or(0),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VersionAction {
    Keep,
    Update {
        version_code: u32,
    },
    PurgeAndUpdate {
        paths_to_delete: Vec<PathBuf>,
        version_code: u32,
    },
}

pub fn reconcile(record: VersionRecord, current: u32, data_root: &Path) -> VersionAction {
    let previous = record.last_version_code;
    if branch(current) < branch(previous) {
        return VersionAction::PurgeAndUpdate {
            paths_to_delete: vec![data_root.to_path_buf()],
            version_code: current,
        };
    }
    if previous != current {
        return VersionAction::Update {
            version_code: current,
        };
    }
    VersionAction::Keep
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct VersionOutcome {
    pub previous: u32,
    pub current: u32,
    #[serde(flatten)]
    pub action: VersionAction,
    pub purge_failures: Vec<String>,
    pub recorded: bool,
}

pub fn apply(
    record: VersionRecord,
    action: VersionAction,
    store: &dyn VersionStore,
    fs: &dyn FileSystem,
    key: &str,
) -> VersionOutcome {
    let previous = record.last_version_code;
    let mut purge_failures = Vec::new();

    let version_code = match &action {
        VersionAction::Keep => None,
        VersionAction::Update { version_code } => Some(*version_code),
        VersionAction::PurgeAndUpdate {
            paths_to_delete,
            version_code,
        } => {
            for path in paths_to_delete {
                tracing::info!(
                    previous,
                    current = *version_code,
                    path = %path.display(),
                    "package downgraded; deleting contents"
                );
                purge_failures.extend(
                    delete_contents(fs, path)
                        .into_iter()
                        .map(|failure| failure.to_string()),
                );
            }
            Some(*version_code)
        }
    };

    let mut recorded = false;
    if let Some(version_code) = version_code {
        match store.set_int(key, version_code) {
            Ok(()) => recorded = true,
            Err(err) => tracing::warn!(error = %err, "failed to record version code"),
        }
    }

    VersionOutcome {
        previous,
        current: version_code.unwrap_or(previous),
        action,
        purge_failures,
        recorded,
    }
}

//! Purpose: Best-effort recursive deletion over an abstract filesystem.
//! Exports: `FileSystem`, `StdFileSystem`, `DeleteFailure`, `delete_contents`.
//! Role: Backs stale-data purging after a version downgrade.
//! Invariants: A failure on one entry never stops attempts on its siblings.
//! Invariants: Symlinks are removed, never followed.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct DeleteFailure {
    pub path: PathBuf,
    pub error: io::Error,
}

impl fmt::Display for DeleteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}

pub trait FileSystem: Send + Sync {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
    /// True only for real directories; a symlink to a directory is not one.
    fn is_dir(&self, path: &Path) -> bool;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn remove_dir(&self, path: &Path) -> io::Result<()>;

    /// Removes `path` and everything beneath it, continuing past failures.
    fn delete_tree(&self, path: &Path) -> Result<(), Vec<DeleteFailure>> {
        let mut failures = Vec::new();
        delete_tree_into(self, path, &mut failures);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}

fn delete_tree_into<F: FileSystem + ?Sized>(
    fs: &F,
    path: &Path,
    failures: &mut Vec<DeleteFailure>,
) {
    if !fs.is_dir(path) {
        if let Err(error) = fs.remove_file(path) {
            failures.push(DeleteFailure {
                path: path.to_path_buf(),
                error,
            });
        }
        return;
    }

    match fs.read_dir(path) {
        Ok(children) => {
            for child in children {
                delete_tree_into(fs, &child, failures);
            }
        }
        Err(error) => {
            failures.push(DeleteFailure {
                path: path.to_path_buf(),
                error,
            });
            return;
        }
    }

    if let Err(error) = fs.remove_dir(path) {
        failures.push(DeleteFailure {
            path: path.to_path_buf(),
            error,
        });
    }
}

/// Deletes every entry under `root`, leaving `root` itself in place.
///
/// A missing or unreadable root is treated as already empty.
pub fn delete_contents(fs: &dyn FileSystem, root: &Path) -> Vec<DeleteFailure> {
    let children = match fs.read_dir(root) {
        Ok(children) => children,
        Err(err) => {
            tracing::debug!(root = %root.display(), error = %err, "nothing to purge");
            return Vec::new();
        }
    };

    let mut failures = Vec::new();
    for child in children {
        if let Err(mut child_failures) = fs.delete_tree(&child) {
            for failure in &child_failures {
                tracing::warn!(path = %failure.path.display(), error = %failure.error, "failed to delete");
            }
            failures.append(&mut child_failures);
        }
    }
    failures
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn is_dir(&self, path: &Path) -> bool {
        std::fs::symlink_metadata(path)
            .map(|meta| meta.file_type().is_dir())
            .unwrap_or(false)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir(path)
    }
}

// Durable integer key-value storage for the last-run version record.
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use fs2::FileExt;
use libc::{EACCES, EPERM};
use serde_json::{Map, Value};

use crate::core::error::{Error, ErrorKind, io_error_kind};

pub trait VersionStore: Send + Sync {
    fn get_int(&self, key: &str) -> Option<u32>;
    fn set_int(&self, key: &str, value: u32) -> Result<(), Error>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, u32>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(self, key: impl Into<String>, value: u32) -> Self {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
        self
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl VersionStore for MemoryStore {
    fn get_int(&self, key: &str) -> Option<u32> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    fn set_int(&self, key: &str, value: u32) -> Result<(), Error> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// A flat JSON object on disk. Writers serialize on a sibling lock file and
/// replace the document with a rename so readers never see a torn write.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }

    fn read_document(&self) -> Result<Map<String, Value>, Error> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => {
                return Err(Error::new(io_error_kind(&err))
                    .with_message("failed to read store")
                    .with_path(&self.path)
                    .with_source(err));
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(Error::new(ErrorKind::Corrupt)
                .with_message("store document is not a JSON object")
                .with_path(&self.path)),
            Err(err) => Err(Error::new(ErrorKind::Corrupt)
                .with_message("store document is not valid JSON")
                .with_path(&self.path)
                .with_source(err)),
        }
    }

    fn write_document(&self, document: &Map<String, Value>) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(document).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode store")
                .with_source(err)
        })?;
        let temp = self.temp_path();
        std::fs::write(&temp, bytes).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message("failed to write store")
                .with_path(&temp)
                .with_source(err)
        })?;
        std::fs::rename(&temp, &self.path).map_err(|err| {
            Error::new(io_error_kind(&err))
                .with_message("failed to replace store")
                .with_path(&self.path)
                .with_source(err)
        })
    }

    fn write_lock(&self) -> Result<WriteLock, Error> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                Error::new(io_error_kind(&err))
                    .with_message("failed to create store directory")
                    .with_path(parent)
                    .with_source(err)
            })?;
        }
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|err| {
                Error::new(io_error_kind(&err))
                    .with_path(&lock_path)
                    .with_source(err)
            })?;
        file.lock_exclusive().map_err(|err| {
            Error::new(lock_error_kind(&err))
                .with_path(&lock_path)
                .with_source(err)
        })?;
        Ok(WriteLock { file })
    }
}

impl VersionStore for JsonFileStore {
    fn get_int(&self, key: &str) -> Option<u32> {
        let document = match self.read_document() {
            Ok(document) => document,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unreadable version store");
                return None;
            }
        };
        document
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
    }

    fn set_int(&self, key: &str, value: u32) -> Result<(), Error> {
        let _lock = self.write_lock()?;
        let mut document = self.read_document()?;
        document.insert(key.to_string(), Value::from(value));
        self.write_document(&document)
    }
}

struct WriteLock {
    file: File,
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_error_kind(err: &io::Error) -> ErrorKind {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return ErrorKind::Permission;
    }
    match err.kind() {
        io::ErrorKind::WouldBlock => ErrorKind::Busy,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}

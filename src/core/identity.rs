//! Purpose: Reconcile the library's slot in a shared, externally owned identifier table.
//! Exports: `NamespaceTable`, `PackageSpec`, `PackageIdentity`, `ResolutionMode`, `IdentityError`, `resolve`.
//! Role: Platform-agnostic core; adapters supply inspection and registration primitives.
//! Invariants: On success the assigned id equals `required_id` unless the table is in direct mode.
//! Invariants: Collision and verification failures never mutate beyond what was already registered.
//! Invariants: Must run at most once per process; callers own that guarantee.

use std::fmt;

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};

/// Slot the library's compiled resources are hardcoded against.
pub const REQUIRED_PACKAGE_ID: u8 = 36;
/// Ids at or above this mean the host already reserves the layout (app-as-shared-lib).
pub const DIRECT_RESOLUTION_THRESHOLD: u8 = 0x7f;
/// Universally reserved base OS slot, omitted from diagnostics.
pub const BASE_NAMESPACE_ID: u8 = 1;

/// Inspection and mutation primitives over a shared identifier table.
///
/// Registration is assumed to allocate identifiers sequentially: each
/// successful `register_entry` consumes exactly one slot, and registering a
/// path that names the library's own content moves the library's assignment
/// to the newly allocated slot.
pub trait NamespaceTable: Send + Sync {
    fn assigned_id(&self, name: &str) -> Option<u8>;
    fn register_entry(&self, path: &str) -> Result<(), Error>;
    fn assignments(&self) -> Vec<(String, u8)>;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageSpec {
    pub name: String,
    pub content_path: String,
    pub required_id: u8,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>, content_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content_path: content_path.into(),
            required_id: REQUIRED_PACKAGE_ID,
        }
    }

    pub fn with_required_id(mut self, required_id: u8) -> Self {
        self.required_id = required_id;
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResolutionMode {
    Direct,
    Aligned,
    Forced { registrations: u8 },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct PackageIdentity {
    pub required_id: u8,
    pub observed_id: u8,
    pub assigned_id: u8,
    pub resolution: ResolutionMode,
    pub resolved: bool,
}

#[derive(Debug)]
pub enum IdentityError {
    NotRegistered {
        name: String,
    },
    IncompatibleLayout {
        observed_id: u8,
        required_id: u8,
        occupancy: String,
    },
    MutationFailed {
        path: String,
        attempt: u8,
        source: Error,
    },
    VerificationFailed {
        expected: u8,
        actual: Option<u8>,
        occupancy: String,
    },
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityError::NotRegistered { name } => {
                write!(f, "package {name} has no entry in the identifier table")
            }
            IdentityError::IncompatibleLayout {
                observed_id,
                required_id,
                occupancy,
            } => write!(
                f,
                "incompatible layout: package id {observed_id} is past required id {required_id}; \
                 cannot coexist with other shared libraries. Loaded packages: {occupancy}"
            ),
            IdentityError::MutationFailed {
                path,
                attempt,
                source,
            } => write!(
                f,
                "failed to register identifier entry {attempt} ({path}): {source}"
            ),
            IdentityError::VerificationFailed {
                expected,
                actual,
                occupancy,
            } => {
                let actual = actual.map_or_else(|| "none".to_string(), |id| id.to_string());
                write!(
                    f,
                    "identifier table did not allocate sequentially: expected id {expected}, \
                     found {actual}. Loaded packages: {occupancy}"
                )
            }
        }
    }
}

impl std::error::Error for IdentityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IdentityError::MutationFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<IdentityError> for Error {
    fn from(err: IdentityError) -> Self {
        Error::new(ErrorKind::Identity)
            .with_message(err.to_string())
            .with_hint("Another shared library occupies the required resource slot; load this library before it or in a separate process.")
    }
}

pub fn resolve(
    table: &dyn NamespaceTable,
    package: &PackageSpec,
) -> Result<PackageIdentity, IdentityError> {
    let required_id = package.required_id;
    let observed_id = table.assigned_id(&package.name).ok_or_else(|| {
        IdentityError::NotRegistered {
            name: package.name.clone(),
        }
    })?;

    if observed_id >= DIRECT_RESOLUTION_THRESHOLD {
        tracing::debug!(observed_id, "identifier table in direct mode; accepting as-is");
        return Ok(PackageIdentity {
            required_id,
            observed_id,
            assigned_id: observed_id,
            resolution: ResolutionMode::Direct,
            resolved: true,
        });
    }

    if observed_id > required_id {
        return Err(IdentityError::IncompatibleLayout {
            observed_id,
            required_id,
            occupancy: occupancy_dump(table),
        });
    }

    let registrations = required_id - observed_id;
    for attempt in 1..=registrations {
        let path = synthetic_entry_path(&package.content_path, usize::from(attempt));
        tracing::debug!(attempt, %path, "registering synthetic identifier entry");
        table
            .register_entry(&path)
            .map_err(|source| IdentityError::MutationFailed {
                path,
                attempt,
                source,
            })?;
    }

    let assigned = table.assigned_id(&package.name);
    if assigned != Some(required_id) {
        return Err(IdentityError::VerificationFailed {
            expected: required_id,
            actual: assigned,
            occupancy: occupancy_dump(table),
        });
    }

    let resolution = if registrations == 0 {
        ResolutionMode::Aligned
    } else {
        ResolutionMode::Forced { registrations }
    };
    tracing::info!(observed_id, required_id, registrations, "package id reconciled");
    Ok(PackageIdentity {
        required_id,
        observed_id,
        assigned_id: required_id,
        resolution,
        resolved: true,
    })
}

/// Prefixes `depth` copies of `/.` so each registration names the same
/// content through a distinct path.
pub fn synthetic_entry_path(content_path: &str, depth: usize) -> String {
    let mut path = String::with_capacity(content_path.len() + depth * 2);
    for _ in 0..depth {
        path.push_str("/.");
    }
    path.push_str(content_path);
    path
}

/// Renders `name -> id` pairs for every slot but the base OS one.
///
/// Dots become underscores so crash scrubbers do not mistake names for URLs.
pub fn occupancy_dump(table: &dyn NamespaceTable) -> String {
    let mut assignments = table.assignments();
    assignments.sort_by_key(|(_, id)| *id);
    assignments
        .into_iter()
        .filter(|(_, id)| *id != BASE_NAMESPACE_ID)
        .map(|(name, id)| format!("{} -> {id}", name.replace('.', "_")))
        .collect::<Vec<_>>()
        .join(",")
}

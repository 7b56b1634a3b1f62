//! Purpose: Define the stable public Rust API boundary for embedboot.
//! Exports: Coordinator, collaborator traits, reference adapters, and result types.
//! Role: Public, additive-only surface used by embedders and the CLI.
//! Invariants: Embedders reach core types only through this module.
//! Invariants: Every collaborator trait has at least one adapter exported here.

mod namespace;

pub use crate::core::config::BootConfig;
pub use crate::core::coordinator::{
    BootstrapSnapshot, Coordinator, CoordinatorBuilder, FatalHandler, HostEnvironment, NoopHost,
    SetupReport, abort_on_identity_error, panic_on_identity_error,
};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::identity::{
    DIRECT_RESOLUTION_THRESHOLD, IdentityError, NamespaceTable, PackageIdentity, PackageSpec,
    REQUIRED_PACKAGE_ID, ResolutionMode, occupancy_dump, resolve,
};
pub use crate::core::loader::{Bootstrapper, CompletionHandler, ThreadBootstrapper};
pub use crate::core::purge::{DeleteFailure, FileSystem, StdFileSystem, delete_contents};
pub use crate::core::store::{JsonFileStore, MemoryStore, VersionStore};
pub use crate::core::version_guard::{
    BRANCH_SCALE, LAST_VERSION_KEY, VersionAction, VersionOutcome, VersionRecord, branch,
    reconcile,
};
pub use namespace::SequentialNamespace;

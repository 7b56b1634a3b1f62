//! Purpose: Library crate behind the `embedboot` CLI and embedders.
//! Exports: `api` (public surface), `core` (coordination, identity, version guard, errors).
//! Role: Brings an embedded library to a usable state exactly once per process.
//! Invariants: All process-wide once-state lives inside a `Coordinator` value.
//! Invariants: Core modules take collaborators explicitly rather than reaching for globals.
pub mod api;
pub mod core;
pub mod data_paths;
pub mod notice;

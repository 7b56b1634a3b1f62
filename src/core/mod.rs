// Core modules: setup coordination, identifier reconciliation, version guard, and errors.
pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod loader;
pub mod purge;
pub mod store;
pub mod version_guard;

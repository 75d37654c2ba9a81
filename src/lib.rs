// ABOUTME: Library root for refsync
// ABOUTME: Exposes sessions, the diff engine, and the synchronizer used by the CLI

pub mod commands;
pub mod config;
pub mod filters;
pub mod postgres;
pub mod schema;
pub mod session;
pub mod sqlite;
pub mod sync;
pub mod utils;
pub mod value;

pub use sync::{SyncOptions, SyncReport, Synchronizer};

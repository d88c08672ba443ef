//! Domain entities and business logic
//!
//! This module contains the core domain types for MirrorSync:
//! - Newtypes for validated identifiers and cache keys
//! - The closed set of supported providers
//! - Manifest and file entry types
//! - The mirror record and its status state machine
//! - Size thresholds
//! - Domain-specific error types

pub mod errors;
pub mod limits;
pub mod manifest;
pub mod mirror;
pub mod newtypes;
pub mod provider;

// Re-export commonly used types
pub use errors::DomainError;
pub use limits::SyncLimits;
pub use manifest::{
    CacheStatus, FileEntry, Manifest, Placeholder, PlaceholderReason, RemoteEntry, RemoteTree,
    MANIFEST_VERSION,
};
pub use mirror::{
    Lease, MirrorCounters, MirrorRecord, MirrorStatus, RemoteRoot, WorkspaceReport,
};
pub use newtypes::*;
pub use provider::Provider;

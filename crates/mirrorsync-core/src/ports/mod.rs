//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the engine depends on,
//! but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IProviderAdapter`] - Remote tree listing and content download
//! - [`IManifestStore`] - Blob cache for manifests and file content
//! - [`IMirrorRepository`] - Persistent mirror records and pass leases
//! - [`IWorkspaceReplicator`] - Downstream workspace pull signal

pub mod manifest_store;
pub mod mirror_repository;
pub mod provider_adapter;
pub mod workspace;

pub use manifest_store::{IManifestStore, IMultipartUpload, ObjectMeta, PartId};
pub use mirror_repository::{CacheStageTotals, IMirrorRepository};
pub use provider_adapter::{ByteStream, FetchedContent, IProviderAdapter, ProviderError};
pub use workspace::{IWorkspaceReplicator, PullSignal, ReplicationError, WorkspaceSession};

//! MirrorSync Providers - HTTP adapters for remote file trees
//!
//! Provides async adapters implementing
//! [`IProviderAdapter`](mirrorsync_core::ports::IProviderAdapter) for:
//! - Google Drive (Drive API v3)
//! - OneDrive (Microsoft Graph)
//! - Dropbox (API v2)
//! - GitHub repositories (contents API)
//!
//! plus the HTTP client for the downstream workspace service.
//!
//! ## Modules
//!
//! - [`client`] - Authenticated HTTP client and error mapping
//! - [`google_drive`], [`onedrive`], [`dropbox`], [`github`] - Adapters
//! - [`registry`] - Builds the adapter for a configured provider
//! - [`workspace`] - Workspace replicator over HTTP

pub mod client;
pub mod dropbox;
pub mod github;
pub mod google_drive;
pub mod onedrive;
pub mod registry;
pub mod workspace;

pub use registry::ProviderAdapter;
pub use workspace::{DisabledReplicator, HttpWorkspaceReplicator};

/// Mime type reported when a provider does not name one
pub(crate) const DEFAULT_MIME: &str = "application/octet-stream";

/// Joins a root-relative folder path and a child name
pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

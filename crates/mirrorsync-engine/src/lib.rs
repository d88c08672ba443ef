//! MirrorSync Engine - Mirror synchronization passes
//!
//! Provides:
//! - Classification of listed entries against the previous manifest
//! - Streaming content writes (single put or multipart)
//! - The sync orchestrator and its record lifecycle operations
//! - The workspace replication trigger
//!
//! ## Modules
//!
//! - [`diff`] - Per-entry classification
//! - [`writer`] - Content cache writer
//! - [`orchestrator`] - Sync passes, large-file backfill, link/unlink
//! - [`replication`] - "Pull mirror now" signalling

pub mod diff;
pub mod orchestrator;
pub mod replication;
pub mod writer;

pub use orchestrator::{
    BackfillSummary, LinkOutcome, Orchestrator, OrchestratorOptions, PassSummary,
};
pub use replication::ReplicationResult;

use thiserror::Error;

use mirrorsync_core::domain::{DomainError, Provider, WorkspaceId};
use mirrorsync_core::ports::ProviderError;

/// Errors returned by orchestrator operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// No mirror record exists for the pair
    #[error("No mirror linked for {provider}/{workspace}")]
    NotLinked {
        provider: Provider,
        workspace: WorkspaceId,
    },

    /// Another pass holds a live lease on the pair
    #[error("A sync pass is already running for {provider}/{workspace}")]
    PassInProgress {
        provider: Provider,
        workspace: WorkspaceId,
    },

    /// The pass lease was taken over by another holder mid-pass
    #[error("Lost the sync lease for {provider}/{workspace}")]
    LeaseLost {
        provider: Provider,
        workspace: WorkspaceId,
    },

    /// No adapter was registered for the provider
    #[error("No adapter configured for provider {0}")]
    NoAdapter(Provider),

    /// Listing the remote tree failed
    #[error("Listing failed: {0}")]
    Listing(#[source] ProviderError),

    /// The record repository or the manifest store failed
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    /// A domain rule was violated
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl EngineError {
    /// Returns true if the pass stopped because its lease was taken over
    #[must_use]
    pub fn is_lease_lost(&self) -> bool {
        matches!(self, Self::LeaseLost { .. })
    }
}

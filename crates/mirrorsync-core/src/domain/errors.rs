//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures and invalid state transitions.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Provider name is not one of the supported providers
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Workspace identifier failed validation
    #[error("Invalid workspace ID: {0}")]
    InvalidWorkspaceId(String),

    /// Remote entry identifier failed validation
    #[error("Invalid entry ID: {0}")]
    InvalidEntryId(String),

    /// Remote root identifier failed validation
    #[error("Invalid root ID: {0}")]
    InvalidRootId(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Manifest document could not be parsed or violates an invariant
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

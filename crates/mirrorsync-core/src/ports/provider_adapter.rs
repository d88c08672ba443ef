//! Provider adapter port (driven/secondary port)
//!
//! One adapter per external file-tree provider. Adapters are stateless apart
//! from their HTTP client and credentials: they list a remote root as a
//! flattened tree and stream the bytes of a single file.
//!
//! ## Design Notes
//!
//! - Uses a typed [`ProviderError`] rather than `anyhow` because the engine
//!   distinguishes a fatal listing failure from a per-entry fetch failure and
//!   reports the category in placeholders.
//! - No retries happen at this layer.

use std::fmt;

use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::domain::{EntryId, Provider, RemoteTree, RootId};

/// Errors reported by provider adapters
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The root or entry does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The bearer token was rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The item cannot be downloaded as bytes
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The provider throttled the request
    #[error("Rate limited, retry after {retry_after:?} seconds")]
    RateLimited {
        /// Seconds to wait, if the provider said
        retry_after: Option<u64>,
    },

    /// Any other non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Transport failure (DNS, TLS, connection reset, body read)
    #[error("Network error: {0}")]
    Network(String),

    /// The response could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Stream of content chunks
pub type ByteStream = BoxStream<'static, Result<Bytes, ProviderError>>;

/// Content of one remote file
pub struct FetchedContent {
    /// Chunks in order
    pub stream: ByteStream,
    /// Size announced by the provider (Content-Length), if any
    pub declared_size: Option<u64>,
    /// Content type, when the provider sent one
    pub content_type: Option<String>,
}

impl fmt::Debug for FetchedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedContent")
            .field("declared_size", &self.declared_size)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Listing and download capability of one provider
#[async_trait::async_trait]
pub trait IProviderAdapter: Send + Sync {
    /// Which provider this adapter talks to
    fn provider(&self) -> Provider;

    /// Lists every directory and file under `root`, breadth-first
    ///
    /// Pages through the native listing API until exhausted. Directory
    /// paths and entry paths are relative to the root without a leading `/`.
    async fn list_tree(&self, root: &RootId) -> Result<RemoteTree, ProviderError>;

    /// Opens a byte stream for one file
    ///
    /// The root is passed because some providers address content relative
    /// to a repository rather than by a global id.
    async fn fetch_content(
        &self,
        root: &RootId,
        entry_id: &EntryId,
    ) -> Result<FetchedContent, ProviderError>;
}

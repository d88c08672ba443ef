//! MirrorSync Cache - Mirror state persistence and blob stores
//!
//! Driven (secondary) adapters for the storage ports of `mirrorsync-core`:
//! - [`SqliteMirrorRepository`] - `IMirrorRepository` over SQLite, with pass leases
//! - [`FsManifestStore`] - `IManifestStore` on the local filesystem
//! - [`MemoryManifestStore`] - `IManifestStore` in process memory
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use mirrorsync_cache::{DatabasePool, FsManifestStore, SqliteMirrorRepository};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/var/lib/mirrorsync/mirrorsync.db")).await?;
//! let repo = SqliteMirrorRepository::new(pool.pool().clone());
//! let store = FsManifestStore::new("/var/lib/mirrorsync/store");
//! # Ok(())
//! # }
//! ```

pub mod fs_store;
pub mod memory_store;
pub mod pool;
pub mod repository;

pub use fs_store::FsManifestStore;
pub use memory_store::MemoryManifestStore;
pub use pool::DatabasePool;
pub use repository::SqliteMirrorRepository;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be mapped back to a domain type
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A blob store operation failed
    #[error("Store I/O error at {path}: {source}")]
    Io {
        /// Key or filesystem path involved
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A multipart upload was completed with parts it never received
    #[error("Invalid multipart upload: {0}")]
    InvalidUpload(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

/// Hex SHA-256 of a part, used as its tag
pub(crate) fn part_etag(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    format!("{:x}", Sha256::digest(data))
}

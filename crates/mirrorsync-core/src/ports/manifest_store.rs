//! Manifest store port (driven/secondary port)
//!
//! Durable key/value blob storage holding, per provider/workspace pair, one
//! manifest document and one blob per cached file. Large blobs are written
//! through a multipart upload session.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (filesystem, memory, object storage) and are not classified by callers.
//! - Keys are [`CacheKey`] values, so adapters never see unvalidated input.

use bytes::Bytes;

use crate::domain::CacheKey;

/// Metadata of a stored object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object size in bytes
    pub size: u64,
}

/// Receipt for one uploaded part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartId {
    /// 1-based part number
    pub part_number: u32,
    /// Store-assigned tag identifying the part content
    pub etag: String,
}

/// An in-progress multipart upload
///
/// The object becomes visible only after [`complete`](Self::complete).
/// After [`abort`](Self::abort) nothing is left behind.
#[async_trait::async_trait]
pub trait IMultipartUpload: Send {
    /// Uploads one part; part numbers start at 1
    async fn upload_part(&mut self, part_number: u32, data: Bytes) -> anyhow::Result<PartId>;

    /// Assembles the parts, in the given order, into the final object
    async fn complete(&mut self, parts: Vec<PartId>) -> anyhow::Result<()>;

    /// Discards all uploaded parts
    async fn abort(&mut self) -> anyhow::Result<()>;
}

/// Key/value blob cache
#[async_trait::async_trait]
pub trait IManifestStore: Send + Sync {
    /// Reads an object, `None` if absent
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<Bytes>>;

    /// Writes an object, replacing any previous one
    async fn put(&self, key: &CacheKey, data: Bytes) -> anyhow::Result<()>;

    /// Returns object metadata, `None` if absent
    async fn head(&self, key: &CacheKey) -> anyhow::Result<Option<ObjectMeta>>;

    /// Starts a multipart upload targeting `key`
    async fn create_multipart_upload(
        &self,
        key: &CacheKey,
    ) -> anyhow::Result<Box<dyn IMultipartUpload>>;

    /// Deletes an object; returns whether it existed
    async fn delete(&self, key: &CacheKey) -> anyhow::Result<bool>;

    /// Lists every key starting with `prefix`, sorted
    async fn list_keys(&self, prefix: &str) -> anyhow::Result<Vec<CacheKey>>;
}

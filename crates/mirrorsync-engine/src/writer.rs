//! Content cache writer
//!
//! Streams one fetched file into the manifest store:
//!
//! - Declared size up to the buffer threshold: read fully, one `put`.
//! - Larger: multipart upload fed by a rolling buffer. Every full
//!   `part_size` chunk becomes a part (numbered from 1); the remainder is
//!   sent as a final, smaller part.
//!
//! Any failure after a multipart upload was created aborts it, so a failed
//! write never leaves an object behind.

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use thiserror::Error;
use tracing::{debug, warn};

use mirrorsync_core::domain::{CacheKey, SyncLimits};
use mirrorsync_core::ports::{
    ByteStream, FetchedContent, IManifestStore, IMultipartUpload, PartId, ProviderError,
};

/// Failure writing one file
#[derive(Debug, Error)]
pub enum WriteError {
    /// Reading the content stream failed
    #[error("Reading content failed: {0}")]
    Stream(#[source] ProviderError),

    /// The store rejected a put, part or completion
    #[error("Store write failed: {0:#}")]
    Store(#[source] anyhow::Error),

    /// A multipart stream ended without yielding any bytes
    #[error("Content stream was empty")]
    EmptyStream,
}

/// Result of a successful write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Bytes stored
    pub bytes: u64,
    /// Parts uploaded; 0 for a single put
    pub parts: u32,
}

/// Writes fetched content under a cache key
pub struct ContentWriter<'a> {
    store: &'a dyn IManifestStore,
    limits: SyncLimits,
}

impl<'a> ContentWriter<'a> {
    pub fn new(store: &'a dyn IManifestStore, limits: SyncLimits) -> Self {
        Self { store, limits }
    }

    /// Writes `content` to `key`
    ///
    /// `listed_size` stands in for the declared size when the provider did
    /// not send one.
    pub async fn write(
        &self,
        key: &CacheKey,
        content: FetchedContent,
        listed_size: u64,
    ) -> Result<WriteOutcome, WriteError> {
        let declared = content.declared_size.unwrap_or(listed_size);

        let outcome = if self.limits.fits_single_put(declared) {
            self.write_single(key, content.stream).await?
        } else {
            self.write_multipart(key, content.stream).await?
        };

        if outcome.bytes != declared {
            warn!(
                key = %key,
                declared,
                actual = outcome.bytes,
                "Content size differs from declared size"
            );
        }
        Ok(outcome)
    }

    async fn write_single(
        &self,
        key: &CacheKey,
        mut stream: ByteStream,
    ) -> Result<WriteOutcome, WriteError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk.map_err(WriteError::Stream)?);
        }

        let bytes = buffer.len() as u64;
        self.store
            .put(key, buffer.freeze())
            .await
            .map_err(WriteError::Store)?;

        debug!(key = %key, bytes, "Stored content");
        Ok(WriteOutcome { bytes, parts: 0 })
    }

    async fn write_multipart(
        &self,
        key: &CacheKey,
        stream: ByteStream,
    ) -> Result<WriteOutcome, WriteError> {
        let mut upload = self
            .store
            .create_multipart_upload(key)
            .await
            .map_err(WriteError::Store)?;

        match self.upload_parts(upload.as_mut(), stream).await {
            Ok(outcome) => {
                debug!(key = %key, bytes = outcome.bytes, parts = outcome.parts, "Stored content in parts");
                Ok(outcome)
            }
            Err(e) => {
                if let Err(abort_err) = upload.abort().await {
                    warn!(key = %key, error = %abort_err, "Failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        upload: &mut dyn IMultipartUpload,
        mut stream: ByteStream,
    ) -> Result<WriteOutcome, WriteError> {
        let part_size = usize::try_from(self.limits.part_size).unwrap_or(usize::MAX);
        let mut buffer = BytesMut::with_capacity(part_size.min(64 * 1024 * 1024));
        let mut parts: Vec<PartId> = Vec::new();
        let mut total: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(WriteError::Stream)?;
            total += chunk.len() as u64;
            buffer.extend_from_slice(&chunk);

            while buffer.len() >= part_size {
                let part = buffer.split_to(part_size).freeze();
                parts.push(send_part(upload, parts.len(), part).await?);
            }
        }

        if total == 0 {
            return Err(WriteError::EmptyStream);
        }
        if !buffer.is_empty() {
            let part = buffer.split().freeze();
            parts.push(send_part(upload, parts.len(), part).await?);
        }

        let count = parts.len() as u32;
        upload.complete(parts).await.map_err(WriteError::Store)?;

        Ok(WriteOutcome {
            bytes: total,
            parts: count,
        })
    }
}

async fn send_part(
    upload: &mut dyn IMultipartUpload,
    already_sent: usize,
    data: Bytes,
) -> Result<PartId, WriteError> {
    let part_number = already_sent as u32 + 1;
    upload
        .upload_part(part_number, data)
        .await
        .map_err(WriteError::Store)
}

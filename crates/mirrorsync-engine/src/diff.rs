//! Per-entry classification against the previous manifest
//!
//! Rules apply in order; the first match wins:
//!
//! 1. Provider-native document (no byte content) -> [`Classification::Unsupported`]
//! 2. `size >= large_file_threshold` -> [`Classification::Large`], even if it was
//!    cached before
//! 3. Previously cached and unchanged -> [`Classification::Reuse`]
//! 4. Anything else -> [`Classification::NeedsFetch`]
//!
//! A reuse decision can be confirmed against the store with
//! [`blob_present`]; a missing blob turns it into a fetch.

use tracing::warn;

use mirrorsync_core::domain::{CacheKey, FileEntry, Provider, RemoteEntry, SyncLimits};
use mirrorsync_core::ports::IManifestStore;

/// What a pass does with one listed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Never fetched; recorded as `skipped_unsupported`
    Unsupported,
    /// Not fetched during a regular pass; recorded as `skipped_large`
    Large,
    /// Cached content is still current
    Reuse,
    /// Content must be downloaded and written
    NeedsFetch,
}

/// Classifies `remote` given the manifest entry with the same id, if any
#[must_use]
pub fn classify(
    provider: Provider,
    limits: &SyncLimits,
    remote: &RemoteEntry,
    prior: Option<&FileEntry>,
) -> Classification {
    if provider.is_unsupported_mime(&remote.mime_type) {
        return Classification::Unsupported;
    }
    if limits.is_large(remote.size) {
        return Classification::Large;
    }
    match prior {
        Some(prior) if prior.is_cached() && prior.is_unchanged(remote) => Classification::Reuse,
        _ => Classification::NeedsFetch,
    }
}

/// Returns true if the blob behind a reuse decision is still in the store
/// with the expected size
///
/// A failing `head` counts as absent so the entry is fetched again.
pub async fn blob_present(store: &dyn IManifestStore, key: &CacheKey, size: u64) -> bool {
    match store.head(key).await {
        Ok(Some(meta)) if meta.size == size => true,
        Ok(Some(meta)) => {
            warn!(key = %key, expected = size, actual = meta.size, "Cached blob has wrong size");
            false
        }
        Ok(None) => {
            warn!(key = %key, "Cached blob missing, fetching again");
            false
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Could not verify cached blob");
            false
        }
    }
}

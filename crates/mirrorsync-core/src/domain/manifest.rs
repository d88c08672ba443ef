//! Manifest domain entity
//!
//! A [`Manifest`] is the durable JSON index of one mirror: the directory list
//! and one [`FileEntry`] per listed file, with its cache status. It is stored
//! next to the cached blobs at `mirror/{provider}/{workspaceId}/manifest.json`.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::mirror::RemoteRoot;
use super::newtypes::{EntryId, RootId};

/// Current manifest document version
pub const MANIFEST_VERSION: u32 = 1;

// ============================================================================
// Remote listing types
// ============================================================================

/// A file as reported by a provider listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    /// Provider-native ID, stable across syncs
    pub id: EntryId,
    /// File name
    pub name: String,
    /// Path relative to the synced root, without a leading `/`
    pub path: String,
    /// Mime type (provider-native documents carry their own types)
    pub mime_type: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time, when the provider reports one
    pub modified_time: Option<DateTime<Utc>>,
    /// Content hash or revision tag, when the provider reports one
    pub content_fingerprint: Option<String>,
}

/// Flattened result of listing a remote root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteTree {
    /// Root-relative directory paths in discovery order
    pub directories: Vec<String>,
    /// Files in discovery order
    pub entries: Vec<RemoteEntry>,
}

impl RemoteTree {
    /// Total size of all listed files
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

// ============================================================================
// Cache status and placeholders
// ============================================================================

/// Whether an entry's bytes are present in the content cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// A blob exists at the entry's cache key
    Cached,
    /// The file is at or above the large file threshold
    SkippedLarge,
    /// The file is a provider-native document or could not be fetched
    SkippedUnsupported,
}

impl CacheStatus {
    /// Returns the canonical name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Cached => "cached",
            CacheStatus::SkippedLarge => "skipped_large",
            CacheStatus::SkippedUnsupported => "skipped_unsupported",
        }
    }
}

impl Display for CacheStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an entry has no cached content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderReason {
    /// Exceeds the large file threshold
    TooLarge,
    /// Provider-native document without a byte representation
    Unsupported,
    /// Fetching or writing the content failed
    FetchFailed,
}

/// Marker left on an entry that is listed but not cached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placeholder {
    /// Reason category
    pub reason: PlaceholderReason,
    /// Human-readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Placeholder {
    /// Placeholder for a file above the large file threshold
    #[must_use]
    pub fn too_large() -> Self {
        Self {
            reason: PlaceholderReason::TooLarge,
            detail: None,
        }
    }

    /// Placeholder for a provider-native document
    #[must_use]
    pub fn unsupported(mime_type: &str) -> Self {
        Self {
            reason: PlaceholderReason::Unsupported,
            detail: Some(format!("unsupported type {mime_type}")),
        }
    }

    /// Placeholder for a failed fetch or write
    #[must_use]
    pub fn fetch_failed(message: impl Into<String>) -> Self {
        Self {
            reason: PlaceholderReason::FetchFailed,
            detail: Some(message.into()),
        }
    }
}

// ============================================================================
// FileEntry
// ============================================================================

/// One file in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Provider-native ID
    pub id: EntryId,
    /// File name
    pub name: String,
    /// Root-relative path
    pub path: String,
    /// Mime type
    pub mime_type: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub modified_time: Option<DateTime<Utc>>,
    /// Content hash or revision tag
    pub content_fingerprint: Option<String>,
    /// Cache status
    pub cache_status: CacheStatus,
    /// Reason the entry is not cached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<Placeholder>,
    /// Bytes held by the cache when they differ from the listed size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_size: Option<u64>,
}

impl FileEntry {
    /// Builds a cached entry from a listed one
    #[must_use]
    pub fn cached(remote: RemoteEntry) -> Self {
        Self::from_remote(remote, CacheStatus::Cached, None)
    }

    /// Builds a cached entry whose blob holds `stored` bytes
    #[must_use]
    pub fn stored(remote: RemoteEntry, stored: u64) -> Self {
        let mut entry = Self::cached(remote);
        entry.stored_size = (stored != entry.size).then_some(stored);
        entry
    }

    /// Builds a not-cached entry carrying a placeholder
    #[must_use]
    pub fn skipped(remote: RemoteEntry, status: CacheStatus, placeholder: Placeholder) -> Self {
        Self::from_remote(remote, status, Some(placeholder))
    }

    fn from_remote(
        remote: RemoteEntry,
        cache_status: CacheStatus,
        placeholder: Option<Placeholder>,
    ) -> Self {
        Self {
            id: remote.id,
            name: remote.name,
            path: remote.path,
            mime_type: remote.mime_type,
            size: remote.size,
            modified_time: remote.modified_time,
            content_fingerprint: remote.content_fingerprint,
            cache_status,
            placeholder,
            stored_size: None,
        }
    }

    /// Returns true if the entry's content is in the cache
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cache_status == CacheStatus::Cached
    }

    /// Size of the cached blob
    #[must_use]
    pub fn stored_bytes(&self) -> u64 {
        self.stored_size.unwrap_or(self.size)
    }

    /// Marks the entry as cached with `stored` bytes and clears any placeholder
    pub fn mark_cached(&mut self, stored: u64) {
        self.cache_status = CacheStatus::Cached;
        self.placeholder = None;
        self.stored_size = (stored != self.size).then_some(stored);
    }

    /// Returns true if `remote` describes the same content as this entry
    ///
    /// With a fingerprint on the listed entry, fingerprints decide (a match
    /// wins over a differing modification time). Without one, both
    /// modification times must be present and equal. Sizes must always match.
    #[must_use]
    pub fn is_unchanged(&self, remote: &RemoteEntry) -> bool {
        if self.size != remote.size {
            return false;
        }

        match (&remote.content_fingerprint, &self.content_fingerprint) {
            (Some(new), Some(old)) => new == old,
            (Some(_), None) => false,
            (None, _) => match (remote.modified_time, self.modified_time) {
                (Some(new), Some(old)) => new == old,
                _ => false,
            },
        }
    }
}

// ============================================================================
// Manifest
// ============================================================================

/// The persisted index of one mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    version: u32,
    root_id: RootId,
    root_name: String,
    root_path: String,
    updated_at: DateTime<Utc>,
    directories: Vec<String>,
    entries: Vec<FileEntry>,
}

impl Manifest {
    /// Builds a manifest, dropping entries whose id was already seen
    ///
    /// Returns the manifest and the ids that were dropped as duplicates.
    #[must_use]
    pub fn build(
        root: &RemoteRoot,
        directories: Vec<String>,
        entries: Vec<FileEntry>,
    ) -> (Self, Vec<EntryId>) {
        let mut seen = HashSet::with_capacity(entries.len());
        let mut duplicates = Vec::new();
        let mut unique = Vec::with_capacity(entries.len());

        for entry in entries {
            if seen.insert(entry.id.clone()) {
                unique.push(entry);
            } else {
                duplicates.push(entry.id);
            }
        }

        let manifest = Self {
            version: MANIFEST_VERSION,
            root_id: root.id.clone(),
            root_name: root.name.clone(),
            root_path: root.path.clone(),
            updated_at: Utc::now(),
            directories,
            entries: unique,
        };
        (manifest, duplicates)
    }

    /// Parses a stored manifest document
    ///
    /// # Errors
    /// Returns `InvalidManifest` if the JSON is malformed, the version is
    /// not [`MANIFEST_VERSION`], or entry ids are not unique
    pub fn from_json(bytes: &[u8]) -> Result<Self, DomainError> {
        let manifest: Manifest = serde_json::from_slice(bytes)
            .map_err(|e| DomainError::InvalidManifest(e.to_string()))?;

        if manifest.version != MANIFEST_VERSION {
            return Err(DomainError::InvalidManifest(format!(
                "unsupported version {} (expected {MANIFEST_VERSION})",
                manifest.version
            )));
        }

        let mut seen = HashSet::with_capacity(manifest.entries.len());
        if let Some(dup) = manifest.entries.iter().find(|e| !seen.insert(&e.id)) {
            return Err(DomainError::InvalidManifest(format!(
                "duplicate entry id {}",
                dup.id
            )));
        }

        Ok(manifest)
    }

    /// Serializes the manifest as pretty-printed JSON
    ///
    /// # Errors
    /// Returns `InvalidManifest` if serialization fails
    pub fn to_json(&self) -> Result<Vec<u8>, DomainError> {
        serde_json::to_vec_pretty(self).map_err(|e| DomainError::InvalidManifest(e.to_string()))
    }

    /// Returns true if both manifests are identical apart from `updated_at`
    #[must_use]
    pub fn same_content(&self, other: &Manifest) -> bool {
        self.version == other.version
            && self.root_id == other.root_id
            && self.root_name == other.root_name
            && self.root_path == other.root_path
            && self.directories == other.directories
            && self.entries == other.entries
    }

    /// Index of entries by id
    #[must_use]
    pub fn index(&self) -> HashMap<&EntryId, &FileEntry> {
        self.entries.iter().map(|e| (&e.id, e)).collect()
    }

    /// Looks up an entry by id
    #[must_use]
    pub fn entry(&self, id: &EntryId) -> Option<&FileEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Mutable lookup of an entry by id
    pub fn entry_mut(&mut self, id: &EntryId) -> Option<&mut FileEntry> {
        self.entries.iter_mut().find(|e| &e.id == id)
    }

    /// Refreshes the modification timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Document version
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Root identifier
    pub fn root_id(&self) -> &RootId {
        &self.root_id
    }

    /// Root display name
    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    /// Root display path
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Last time the manifest was built or changed
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Directory paths in discovery order
    pub fn directories(&self) -> &[String] {
        &self.directories
    }

    /// File entries in listing order
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Number and total size of entries with the given status
    #[must_use]
    pub fn totals_for(&self, status: CacheStatus) -> (u64, u64) {
        self.entries
            .iter()
            .filter(|e| e.cache_status == status)
            .fold((0, 0), |(files, bytes), e| (files + 1, bytes + e.size))
    }
}

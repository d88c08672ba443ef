//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time, so that nothing
//! derived from untrusted input can reach a storage namespace unchecked.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;
use super::provider::Provider;

/// Maximum length of a workspace identifier
const MAX_WORKSPACE_ID_LEN: usize = 128;

/// Maximum length of provider-native identifiers (entry and root IDs)
const MAX_REMOTE_ID_LEN: usize = 1024;

// ============================================================================
// WorkspaceId
// ============================================================================

/// Identifier of the SaaS workspace that owns a mirror
///
/// Format: 1-128 characters from `[A-Za-z0-9_-]`. The restricted alphabet
/// makes the value safe to embed in cache keys as a single path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Create a new WorkspaceId
    ///
    /// # Errors
    /// Returns error if the ID is empty, too long, or contains characters
    /// outside `[A-Za-z0-9_-]`
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidWorkspaceId(
                "Workspace ID cannot be empty".to_string(),
            ));
        }

        if id.len() > MAX_WORKSPACE_ID_LEN {
            return Err(DomainError::InvalidWorkspaceId(format!(
                "Workspace ID exceeds {MAX_WORKSPACE_ID_LEN} characters"
            )));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DomainError::InvalidWorkspaceId(format!(
                "Workspace ID contains invalid characters: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for WorkspaceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkspaceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for WorkspaceId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<WorkspaceId> for String {
    fn from(id: WorkspaceId) -> Self {
        id.0
    }
}

// ============================================================================
// Provider-native identifiers
// ============================================================================

/// Rejects empty, oversized, or control-character-bearing remote identifiers
fn validate_remote_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("identifier cannot be empty".to_string());
    }
    if id.len() > MAX_REMOTE_ID_LEN {
        return Err(format!("identifier exceeds {MAX_REMOTE_ID_LEN} bytes"));
    }
    if id.chars().any(char::is_control) {
        return Err(format!("identifier contains control characters: {id:?}"));
    }
    Ok(())
}

/// Provider-native identifier of a file entry, stable across syncs
///
/// For most providers this is an opaque ID; for source-control providers
/// it is the repository-relative path, so it may contain `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryId(String);

impl EntryId {
    /// Create a new EntryId
    ///
    /// # Errors
    /// Returns error if the ID is empty, longer than 1024 bytes, or contains
    /// control characters
    pub fn new(id: String) -> Result<Self, DomainError> {
        validate_remote_id(&id).map_err(DomainError::InvalidEntryId)?;
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Percent-encoded form used as a single cache key segment
    #[must_use]
    pub fn key_segment(&self) -> String {
        url::form_urlencoded::byte_serialize(self.0.as_bytes()).collect()
    }
}

impl Display for EntryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for EntryId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<EntryId> for String {
    fn from(id: EntryId) -> Self {
        id.0
    }
}

/// Provider-native identifier of the synced root folder or repository
///
/// Examples: a Drive folder ID, `"root"` for OneDrive, a Dropbox path such
/// as `/Team`, or `owner/repo@main` for GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RootId(String);

impl RootId {
    /// Create a new RootId
    ///
    /// # Errors
    /// Returns error if the ID is empty, longer than 1024 bytes, or contains
    /// control characters
    pub fn new(id: String) -> Result<Self, DomainError> {
        validate_remote_id(&id).map_err(DomainError::InvalidRootId)?;
        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RootId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RootId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RootId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RootId> for String {
    fn from(id: RootId) -> Self {
        id.0
    }
}

// ============================================================================
// LeaseId
// ============================================================================

/// Identifier of the holder of a mirror pass lease
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(Uuid);

impl LeaseId {
    /// Create a new random LeaseId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LeaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for LeaseId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LeaseId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::ValidationFailed(format!("Invalid LeaseId: {e}")))
    }
}

// ============================================================================
// CacheKey
// ============================================================================

/// Deterministic blob-store key
///
/// Keys are only built from a validated [`Provider`], [`WorkspaceId`] and
/// [`EntryId`]:
/// - manifest: `mirror/{provider}/{workspaceId}/manifest.json`
/// - file blob: `mirror/{provider}/{workspaceId}/files/{entryId}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Key of the manifest document for a provider/workspace pair
    #[must_use]
    pub fn manifest(provider: Provider, workspace: &WorkspaceId) -> Self {
        Self(format!("{}manifest.json", Self::prefix(provider, workspace)))
    }

    /// Key of the cached blob for one file entry
    #[must_use]
    pub fn file(provider: Provider, workspace: &WorkspaceId, entry: &EntryId) -> Self {
        Self(format!(
            "{}files/{}",
            Self::prefix(provider, workspace),
            entry.key_segment()
        ))
    }

    /// Namespace prefix (with trailing `/`) for everything owned by a pair
    #[must_use]
    pub fn prefix(provider: Provider, workspace: &WorkspaceId) -> String {
        format!("mirror/{}/{}/", provider.as_str(), workspace.as_str())
    }

    /// Re-validate a raw key, e.g. one returned by a store listing
    ///
    /// # Errors
    /// Returns error if the key is empty, absolute, or contains `.`/`..`
    /// or empty segments
    pub fn new(key: String) -> Result<Self, DomainError> {
        if key.is_empty() || key.starts_with('/') {
            return Err(DomainError::ValidationFailed(format!(
                "Invalid cache key: {key:?}"
            )));
        }
        if key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(DomainError::ValidationFailed(format!(
                "Cache key contains an invalid segment: {key}"
            )));
        }
        Ok(Self(key))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

// ============================================================================
// Tests
// ============================================================================

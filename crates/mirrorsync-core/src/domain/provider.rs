//! Closed set of supported file-tree providers
//!
//! Provider names arrive from untrusted input (CLI arguments, inbound status
//! updates). They are parsed into [`Provider`] before being used to select a
//! cache namespace, a database row, or an adapter.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Mime type prefix of Google-native documents (Docs, Sheets, Slides, ...)
pub const GOOGLE_APPS_MIME_PREFIX: &str = "application/vnd.google-apps.";

/// Mime type of Google Drive folders
pub const GOOGLE_FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Mime type assigned to OneDrive items with a `package` facet (OneNote notebooks)
pub const ONEDRIVE_PACKAGE_MIME: &str = "application/vnd.microsoft.onedrive.package";

/// Mime type assigned to Dropbox files that cannot be downloaded (Paper, cloud docs)
pub const DROPBOX_CLOUD_DOC_MIME: &str = "application/vnd.dropbox.cloud-doc";

/// Mime type assigned to git submodule entries
pub const GIT_SUBMODULE_MIME: &str = "application/x-git-submodule";

/// Mime type assigned to git symlink entries
pub const GIT_SYMLINK_MIME: &str = "inode/symlink";

/// A supported external file-tree provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Provider {
    /// Google Drive (Drive API v3)
    GoogleDrive,
    /// Microsoft OneDrive (Graph API)
    OneDrive,
    /// Dropbox (API v2)
    Dropbox,
    /// GitHub repositories (REST contents API)
    GitHub,
}

impl Provider {
    /// Every supported provider, in display order
    pub const ALL: [Provider; 4] = [
        Provider::GoogleDrive,
        Provider::OneDrive,
        Provider::Dropbox,
        Provider::GitHub,
    ];

    /// Canonical lowercase name, used in cache keys and the database
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Provider::GoogleDrive => "google_drive",
            Provider::OneDrive => "onedrive",
            Provider::Dropbox => "dropbox",
            Provider::GitHub => "github",
        }
    }

    /// Returns true if entries with this mime type are provider-native
    /// documents that have no downloadable byte representation
    #[must_use]
    pub fn is_unsupported_mime(&self, mime_type: &str) -> bool {
        match self {
            Provider::GoogleDrive => mime_type.starts_with(GOOGLE_APPS_MIME_PREFIX),
            Provider::OneDrive => mime_type == ONEDRIVE_PACKAGE_MIME,
            Provider::Dropbox => mime_type == DROPBOX_CLOUD_DOC_MIME,
            Provider::GitHub => mime_type == GIT_SUBMODULE_MIME || mime_type == GIT_SYMLINK_MIME,
        }
    }
}

impl Display for Provider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| DomainError::UnknownProvider(s.to_string()))
    }
}

impl TryFrom<String> for Provider {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Provider> for String {
    fn from(p: Provider) -> Self {
        p.as_str().to_string()
    }
}

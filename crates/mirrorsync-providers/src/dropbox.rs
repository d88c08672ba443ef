//! Dropbox adapter (API v2)
//!
//! Listing is RPC-style: `POST /2/files/list_folder`, then
//! `/2/files/list_folder/continue` with the cursor while `has_more`.
//! Downloads go to the separate content host with the argument in the
//! `Dropbox-API-Arg` header.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use mirrorsync_core::domain::provider::DROPBOX_CLOUD_DOC_MIME;
use mirrorsync_core::domain::{EntryId, Provider, RemoteEntry, RemoteTree, RootId};
use mirrorsync_core::ports::{FetchedContent, IProviderAdapter, ProviderError};

use crate::client::{into_content, ApiClient};
use crate::{join_path, DEFAULT_MIME};

/// Default RPC host
pub const DEFAULT_BASE_URL: &str = "https://api.dropboxapi.com";

/// Default content (download) host
pub const DEFAULT_CONTENT_BASE_URL: &str = "https://content.dropboxapi.com";

const API_ARG_HEADER: &str = "Dropbox-API-Arg";

// ============================================================================
// API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ListFolderArg<'a> {
    path: &'a str,
    recursive: bool,
    include_deleted: bool,
}

#[derive(Debug, Serialize)]
struct ContinueArg<'a> {
    cursor: &'a str,
}

#[derive(Debug, Serialize)]
struct DownloadArg<'a> {
    path: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListFolderResult {
    #[serde(default)]
    entries: Vec<Metadata>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
enum Metadata {
    File(FileMetadata),
    Folder(FolderMetadata),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct FileMetadata {
    id: String,
    name: String,
    #[serde(default)]
    size: u64,
    server_modified: Option<DateTime<Utc>>,
    content_hash: Option<String>,
    #[serde(default = "default_true")]
    is_downloadable: bool,
}

#[derive(Debug, Deserialize)]
struct FolderMetadata {
    id: String,
    name: String,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// DropboxAdapter
// ============================================================================

/// Provider adapter for Dropbox
#[derive(Debug, Clone)]
pub struct DropboxAdapter {
    api: ApiClient,
    content: ApiClient,
}

impl DropboxAdapter {
    /// Creates an adapter against the public Dropbox hosts
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_urls(access_token, DEFAULT_BASE_URL, DEFAULT_CONTENT_BASE_URL)
    }

    /// Creates an adapter against custom RPC and content hosts
    pub fn with_base_urls(
        access_token: impl Into<String>,
        base_url: impl Into<String>,
        content_base_url: impl Into<String>,
    ) -> Self {
        let token = access_token.into();
        Self {
            api: ApiClient::with_base_url(token.clone(), base_url),
            content: ApiClient::with_base_url(token, content_base_url),
        }
    }

    async fn list_folder(&self, path: &str) -> Result<Vec<Metadata>, ProviderError> {
        let request = self
            .api
            .request(Method::POST, "/2/files/list_folder")
            .json(&ListFolderArg {
                path,
                recursive: false,
                include_deleted: false,
            });
        let mut page: ListFolderResult =
            self.api.send_json(request).await.map_err(map_endpoint_error)?;

        let mut entries = std::mem::take(&mut page.entries);
        let mut pages = 1u32;

        while page.has_more {
            let request = self
                .api
                .request(Method::POST, "/2/files/list_folder/continue")
                .json(&ContinueArg {
                    cursor: &page.cursor,
                });
            page = self.api.send_json(request).await.map_err(map_endpoint_error)?;
            pages += 1;
            entries.append(&mut page.entries);
        }

        debug!(path, pages, children = entries.len(), "Listed Dropbox folder");
        Ok(entries)
    }
}

/// The account root is addressed by the empty path
fn listing_path(root: &RootId) -> &str {
    match root.as_str() {
        "/" => "",
        other => other,
    }
}

/// Dropbox reports endpoint-specific failures as 409 with a tagged summary
fn map_endpoint_error(error: ProviderError) -> ProviderError {
    match error {
        ProviderError::Http {
            status: 409,
            message,
        } if message.contains("not_found") => ProviderError::NotFound(message),
        ProviderError::Http {
            status: 409,
            message,
        } if message.contains("unsupported_file") => ProviderError::Unsupported(message),
        other => other,
    }
}

/// Serializes a header argument, escaping non-ASCII characters as the
/// header value must stay ASCII
fn header_json<T: Serialize>(value: &T) -> Result<String, ProviderError> {
    let json = serde_json::to_string(value)
        .map_err(|e| ProviderError::InvalidResponse(format!("cannot encode argument: {e}")))?;
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    Ok(out)
}

fn to_remote_entry(file: FileMetadata, parent: &str) -> Result<RemoteEntry, ProviderError> {
    let id = EntryId::new(file.id).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    let mime_type = if file.is_downloadable {
        DEFAULT_MIME
    } else {
        DROPBOX_CLOUD_DOC_MIME
    };

    Ok(RemoteEntry {
        id,
        path: join_path(parent, &file.name),
        name: file.name,
        mime_type: mime_type.to_string(),
        size: file.size,
        modified_time: file.server_modified,
        content_fingerprint: file.content_hash,
    })
}

#[async_trait::async_trait]
impl IProviderAdapter for DropboxAdapter {
    fn provider(&self) -> Provider {
        Provider::Dropbox
    }

    async fn list_tree(&self, root: &RootId) -> Result<RemoteTree, ProviderError> {
        let mut tree = RemoteTree::default();
        let mut queue = VecDeque::from([(listing_path(root).to_string(), String::new())]);

        while let Some((folder, folder_path)) = queue.pop_front() {
            for metadata in self.list_folder(&folder).await? {
                match metadata {
                    Metadata::Folder(dir) => {
                        let path = join_path(&folder_path, &dir.name);
                        tree.directories.push(path.clone());
                        // Folder ids ("id:...") are accepted wherever a path is
                        queue.push_back((dir.id, path));
                    }
                    Metadata::File(file) => {
                        tree.entries.push(to_remote_entry(file, &folder_path)?);
                    }
                    Metadata::Other => {}
                }
            }
        }

        Ok(tree)
    }

    async fn fetch_content(
        &self,
        _root: &RootId,
        entry_id: &EntryId,
    ) -> Result<FetchedContent, ProviderError> {
        let arg = header_json(&DownloadArg {
            path: entry_id.as_str(),
        })?;
        let request = self
            .content
            .request(Method::POST, "/2/files/download")
            .header(API_ARG_HEADER, arg);

        let response = self
            .content
            .send(request)
            .await
            .map_err(map_endpoint_error)?;
        Ok(into_content(response))
    }
}

//! Google Drive adapter (Drive API v3)
//!
//! Lists a folder breadth-first with `files.list` (`q='{folder}' in parents`),
//! following `nextPageToken`. Folders are recognised by their mime type;
//! Google-native documents have no binary content and are reported with
//! their native mime type so they classify as unsupported.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use mirrorsync_core::domain::provider::GOOGLE_FOLDER_MIME;
use mirrorsync_core::domain::{EntryId, Provider, RemoteEntry, RemoteTree, RootId};
use mirrorsync_core::ports::{FetchedContent, IProviderAdapter, ProviderError};

use crate::client::{into_content, ApiClient};
use crate::join_path;

/// Default Drive API host
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,size,modifiedTime,md5Checksum)";
const PAGE_SIZE: &str = "1000";

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    /// Drive encodes int64 values as strings
    size: Option<String>,
    modified_time: Option<DateTime<Utc>>,
    md5_checksum: Option<String>,
}

// ============================================================================
// GoogleDriveAdapter
// ============================================================================

/// Provider adapter for Google Drive
#[derive(Debug, Clone)]
pub struct GoogleDriveAdapter {
    client: ApiClient,
}

impl GoogleDriveAdapter {
    /// Creates an adapter against the public Drive API
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, DEFAULT_BASE_URL)
    }

    /// Creates an adapter against a custom host (useful for testing)
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: ApiClient::with_base_url(access_token, base_url),
        }
    }

    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveFile>, ProviderError> {
        let query = format!(
            "'{}' in parents and trashed=false",
            folder_id.replace('\\', "\\\\").replace('\'', "\\'")
        );

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let mut params = vec![
                ("q", query.as_str()),
                ("fields", LIST_FIELDS),
                ("pageSize", PAGE_SIZE),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let request = self
                .client
                .request(Method::GET, "/drive/v3/files")
                .query(&params);
            let page: FileList = self.client.send_json(request).await?;
            pages += 1;
            files.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(folder_id, pages, children = files.len(), "Listed Drive folder");
        Ok(files)
    }
}

fn to_remote_entry(file: DriveFile, parent: &str) -> Result<RemoteEntry, ProviderError> {
    let size = match file.size.as_deref() {
        Some(s) => s
            .parse::<u64>()
            .map_err(|e| ProviderError::InvalidResponse(format!("bad size '{s}': {e}")))?,
        None => 0,
    };
    let id = EntryId::new(file.id).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    Ok(RemoteEntry {
        id,
        path: join_path(parent, &file.name),
        name: file.name,
        mime_type: file.mime_type,
        size,
        modified_time: file.modified_time,
        content_fingerprint: file.md5_checksum,
    })
}

#[async_trait::async_trait]
impl IProviderAdapter for GoogleDriveAdapter {
    fn provider(&self) -> Provider {
        Provider::GoogleDrive
    }

    async fn list_tree(&self, root: &RootId) -> Result<RemoteTree, ProviderError> {
        let mut tree = RemoteTree::default();
        let mut queue = VecDeque::from([(root.as_str().to_string(), String::new())]);

        while let Some((folder_id, folder_path)) = queue.pop_front() {
            for file in self.list_children(&folder_id).await? {
                if file.mime_type == GOOGLE_FOLDER_MIME {
                    let path = join_path(&folder_path, &file.name);
                    tree.directories.push(path.clone());
                    queue.push_back((file.id, path));
                } else {
                    tree.entries.push(to_remote_entry(file, &folder_path)?);
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
        let url = self
            .client
            .url_for(&["drive", "v3", "files"], &[entry_id.as_str()])?;
        let request = self
            .client
            .request_url(Method::GET, url)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")]);

        let response = self.client.send(request).await?;
        Ok(into_content(response))
    }
}

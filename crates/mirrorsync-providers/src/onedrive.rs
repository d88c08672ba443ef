//! OneDrive adapter (Microsoft Graph)
//!
//! Lists `/me/drive/items/{id}/children` breadth-first, following the
//! absolute `@odata.nextLink` until it disappears. Items carrying a
//! `package` facet (OneNote notebooks) cannot be downloaded as one file and
//! are reported with a package mime type.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use mirrorsync_core::domain::provider::ONEDRIVE_PACKAGE_MIME;
use mirrorsync_core::domain::{EntryId, Provider, RemoteEntry, RemoteTree, RootId};
use mirrorsync_core::ports::{FetchedContent, IProviderAdapter, ProviderError};

use crate::client::{into_content, ApiClient};
use crate::{join_path, DEFAULT_MIME};

/// Default Microsoft Graph endpoint
pub const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

const PAGE_SIZE: &str = "200";

// ============================================================================
// Graph API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChildrenPage {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    id: String,
    name: String,
    #[serde(default)]
    size: u64,
    last_modified_date_time: Option<DateTime<Utc>>,
    file: Option<FileFacet>,
    folder: Option<serde_json::Value>,
    package: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileFacet {
    mime_type: Option<String>,
    hashes: Option<Hashes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Hashes {
    sha256_hash: Option<String>,
    quick_xor_hash: Option<String>,
}

// ============================================================================
// OneDriveAdapter
// ============================================================================

/// Provider adapter for OneDrive
#[derive(Debug, Clone)]
pub struct OneDriveAdapter {
    client: ApiClient,
}

impl OneDriveAdapter {
    /// Creates an adapter against Microsoft Graph
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, DEFAULT_BASE_URL)
    }

    /// Creates an adapter against a custom host (useful for testing)
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: ApiClient::with_base_url(access_token, base_url),
        }
    }

    async fn list_children(&self, item_id: &str) -> Result<Vec<DriveItem>, ProviderError> {
        let url = self
            .client
            .url_for(&["me", "drive", "items"], &[item_id, "children"])?;
        let first = self
            .client
            .request_url(Method::GET, url)
            .query(&[("$top", PAGE_SIZE)]);
        let mut page: ChildrenPage = self.client.send_json(first).await?;

        let mut items = std::mem::take(&mut page.value);
        let mut pages = 1u32;

        // nextLink is absolute and already carries the skip token
        while let Some(next_link) = page.next_link.take() {
            let next = Url::parse(&next_link)
                .map_err(|e| ProviderError::InvalidResponse(format!("bad nextLink: {e}")))?;
            page = self
                .client
                .send_json(self.client.request_url(Method::GET, next))
                .await?;
            pages += 1;
            items.append(&mut page.value);
        }

        debug!(item_id, pages, children = items.len(), "Listed OneDrive folder");
        Ok(items)
    }
}

fn to_remote_entry(item: DriveItem, parent: &str) -> Result<RemoteEntry, ProviderError> {
    let id = EntryId::new(item.id).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    let (mime_type, fingerprint) = if item.package.is_some() {
        (ONEDRIVE_PACKAGE_MIME.to_string(), None)
    } else {
        let file = item.file.as_ref();
        let mime = file
            .and_then(|f| f.mime_type.clone())
            .unwrap_or_else(|| DEFAULT_MIME.to_string());
        let hashes = file.and_then(|f| f.hashes.as_ref());
        let fingerprint = hashes
            .and_then(|h| h.sha256_hash.clone())
            .or_else(|| hashes.and_then(|h| h.quick_xor_hash.clone()));
        (mime, fingerprint)
    };

    Ok(RemoteEntry {
        id,
        path: join_path(parent, &item.name),
        name: item.name,
        mime_type,
        size: item.size,
        modified_time: item.last_modified_date_time,
        content_fingerprint: fingerprint,
    })
}

#[async_trait::async_trait]
impl IProviderAdapter for OneDriveAdapter {
    fn provider(&self) -> Provider {
        Provider::OneDrive
    }

    async fn list_tree(&self, root: &RootId) -> Result<RemoteTree, ProviderError> {
        let mut tree = RemoteTree::default();
        let mut queue = VecDeque::from([(root.as_str().to_string(), String::new())]);

        while let Some((item_id, folder_path)) = queue.pop_front() {
            for item in self.list_children(&item_id).await? {
                if item.folder.is_some() && item.package.is_none() {
                    let path = join_path(&folder_path, &item.name);
                    tree.directories.push(path.clone());
                    queue.push_back((item.id, path));
                } else {
                    tree.entries.push(to_remote_entry(item, &folder_path)?);
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
            .url_for(&["me", "drive", "items"], &[entry_id.as_str(), "content"])?;
        // Graph answers with a redirect to a pre-authenticated URL; reqwest follows it
        let response = self
            .client
            .send(self.client.request_url(Method::GET, url))
            .await?;
        Ok(into_content(response))
    }
}

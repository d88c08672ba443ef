//! GitHub adapter (git trees and repository contents APIs)
//!
//! A root is a repository, `owner/repo` or `owner/repo@ref`. The whole tree
//! is listed with one `GET /repos/{owner}/{repo}/git/trees/{ref}?recursive=1`.
//! When GitHub truncates that response, directories are walked one at a time
//! with `GET /repos/{owner}/{repo}/contents/{path}` instead. Entries are
//! identified by their repository-relative path and fingerprinted by their
//! git blob sha. Git carries no per-file modification time, so
//! `modified_time` is always `None`.

use std::collections::VecDeque;
use std::fmt;

use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, warn};

use mirrorsync_core::domain::provider::{GIT_SUBMODULE_MIME, GIT_SYMLINK_MIME};
use mirrorsync_core::domain::{EntryId, Provider, RemoteEntry, RemoteTree, RootId};
use mirrorsync_core::ports::{FetchedContent, IProviderAdapter, ProviderError};

use crate::client::{into_content, ApiClient};
use crate::DEFAULT_MIME;

/// Default REST API host
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";

/// Tree ref used when the root names none
const DEFAULT_TREE_REF: &str = "HEAD";
/// Git file mode of a symbolic link
const SYMLINK_MODE: &str = "120000";

// ============================================================================
// Repository root
// ============================================================================

/// A repository and optional ref parsed from a root id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
    /// Branch, tag or commit; the default branch when `None`
    pub reference: Option<String>,
}

impl RepoRef {
    /// Parses `owner/repo` or `owner/repo@ref`
    pub fn parse(root: &str) -> Result<Self, ProviderError> {
        let invalid = || ProviderError::NotFound(format!("not a repository root: '{root}'"));

        let (repo_part, reference) = match root.split_once('@') {
            Some((repo, reference)) if !reference.is_empty() => {
                (repo, Some(reference.to_string()))
            }
            Some(_) => return Err(invalid()),
            None => (root, None),
        };
        let (owner, repo) = repo_part.split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            reference,
        })
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)?;
        if let Some(reference) = &self.reference {
            write!(f, "@{reference}")?;
        }
        Ok(())
    }
}

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ContentItem {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    path: String,
    sha: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct GitTree {
    #[serde(default)]
    truncated: bool,
    tree: Vec<TreeItem>,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    mode: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    size: u64,
}

impl From<TreeItem> for ContentItem {
    fn from(item: TreeItem) -> Self {
        let kind = match (item.kind.as_str(), item.mode.as_str()) {
            ("tree", _) => "dir",
            ("commit", _) => "submodule",
            (_, SYMLINK_MODE) => "symlink",
            _ => "file",
        };
        let name = item.path.rsplit('/').next().unwrap_or(&item.path).to_string();
        Self {
            kind: kind.to_string(),
            name,
            path: item.path,
            sha: item.sha,
            size: item.size,
        }
    }
}

// ============================================================================
// GitHubAdapter
// ============================================================================

/// Provider adapter for GitHub repositories
#[derive(Debug, Clone)]
pub struct GitHubAdapter {
    client: ApiClient,
}

impl GitHubAdapter {
    /// Creates an adapter against api.github.com
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, DEFAULT_BASE_URL)
    }

    /// Creates an adapter against a custom host (GitHub Enterprise or tests)
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: ApiClient::with_base_url(access_token, base_url),
        }
    }

    fn contents_request(
        &self,
        repo: &RepoRef,
        path: &str,
        media_type: &str,
    ) -> Result<RequestBuilder, ProviderError> {
        let mut segments = vec![repo.owner.as_str(), repo.repo.as_str(), "contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = self.client.url_for(&["repos"], &segments)?;

        let mut request = self
            .client
            .request_url(Method::GET, url)
            .header(ACCEPT, media_type)
            .header(API_VERSION_HEADER, API_VERSION);
        if let Some(reference) = &repo.reference {
            request = request.query(&[("ref", reference.as_str())]);
        }
        Ok(request)
    }

    async fn recursive_tree(&self, repo: &RepoRef) -> Result<GitTree, ProviderError> {
        let reference = repo.reference.as_deref().unwrap_or(DEFAULT_TREE_REF);
        let url = self.client.url_for(
            &["repos"],
            &[repo.owner.as_str(), repo.repo.as_str(), "git", "trees", reference],
        )?;
        let request = self
            .client
            .request_url(Method::GET, url)
            .header(ACCEPT, JSON_MEDIA_TYPE)
            .header(API_VERSION_HEADER, API_VERSION)
            .query(&[("recursive", "1")]);

        let tree: GitTree = self.client.send_json(request).await?;
        debug!(repo = %repo, items = tree.tree.len(), truncated = tree.truncated, "Listed repository tree");
        Ok(tree)
    }

    /// Lists the tree one directory at a time
    async fn walk_directories(&self, repo: &RepoRef) -> Result<RemoteTree, ProviderError> {
        let mut tree = RemoteTree::default();
        let mut queue = VecDeque::from([String::new()]);

        while let Some(dir) = queue.pop_front() {
            for item in self.list_directory(repo, &dir).await? {
                if item.kind == "dir" {
                    tree.directories.push(item.path.clone());
                    queue.push_back(item.path);
                } else {
                    tree.entries.push(to_remote_entry(item)?);
                }
            }
        }

        Ok(tree)
    }

    async fn list_directory(
        &self,
        repo: &RepoRef,
        path: &str,
    ) -> Result<Vec<ContentItem>, ProviderError> {
        let request = self.contents_request(repo, path, JSON_MEDIA_TYPE)?;
        let items: Vec<ContentItem> = self.client.send_json(request).await?;
        debug!(repo = %repo, path, children = items.len(), "Listed repository directory");
        Ok(items)
    }
}

fn to_remote_entry(item: ContentItem) -> Result<RemoteEntry, ProviderError> {
    let mime_type = match item.kind.as_str() {
        "submodule" => GIT_SUBMODULE_MIME,
        "symlink" => GIT_SYMLINK_MIME,
        _ => DEFAULT_MIME,
    };
    let id = EntryId::new(item.path.clone())
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    Ok(RemoteEntry {
        id,
        name: item.name,
        path: item.path,
        mime_type: mime_type.to_string(),
        size: item.size,
        modified_time: None,
        content_fingerprint: Some(item.sha),
    })
}

#[async_trait::async_trait]
impl IProviderAdapter for GitHubAdapter {
    fn provider(&self) -> Provider {
        Provider::GitHub
    }

    async fn list_tree(&self, root: &RootId) -> Result<RemoteTree, ProviderError> {
        let repo = RepoRef::parse(root.as_str())?;
        let listing = self.recursive_tree(&repo).await?;
        if listing.truncated {
            warn!(repo = %repo, "Repository tree listing truncated, walking directories");
            return self.walk_directories(&repo).await;
        }

        let mut tree = RemoteTree::default();
        for item in listing.tree.into_iter().map(ContentItem::from) {
            if item.kind == "dir" {
                tree.directories.push(item.path);
            } else {
                tree.entries.push(to_remote_entry(item)?);
            }
        }
        Ok(tree)
    }

    async fn fetch_content(
        &self,
        root: &RootId,
        entry_id: &EntryId,
    ) -> Result<FetchedContent, ProviderError> {
        let repo = RepoRef::parse(root.as_str())?;
        let request = self.contents_request(&repo, entry_id.as_str(), RAW_MEDIA_TYPE)?;
        let response = self.client.send(request).await?;
        Ok(into_content(response))
    }
}

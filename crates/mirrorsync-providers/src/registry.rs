//! Adapter selection
//!
//! [`ProviderAdapter`] is a closed set of the concrete adapters so the CLI
//! can hand one value to the orchestrator without boxing.

use mirrorsync_core::config::ProviderEndpointConfig;
use mirrorsync_core::domain::{EntryId, Provider, RemoteTree, RootId};
use mirrorsync_core::ports::{FetchedContent, IProviderAdapter, ProviderError};

use crate::dropbox::{self, DropboxAdapter};
use crate::github::GitHubAdapter;
use crate::google_drive::GoogleDriveAdapter;
use crate::onedrive::OneDriveAdapter;

/// Any of the supported provider adapters
#[derive(Debug, Clone)]
pub enum ProviderAdapter {
    GoogleDrive(GoogleDriveAdapter),
    OneDrive(OneDriveAdapter),
    Dropbox(DropboxAdapter),
    GitHub(GitHubAdapter),
}

impl ProviderAdapter {
    /// Builds the adapter for `provider` from its endpoint settings
    pub fn from_config(
        provider: Provider,
        endpoint: &ProviderEndpointConfig,
        access_token: impl Into<String>,
    ) -> Self {
        let token = access_token.into();
        let base_url = endpoint.base_url.as_str();
        match provider {
            Provider::GoogleDrive => {
                Self::GoogleDrive(GoogleDriveAdapter::with_base_url(token, base_url))
            }
            Provider::OneDrive => Self::OneDrive(OneDriveAdapter::with_base_url(token, base_url)),
            Provider::Dropbox => {
                let content = endpoint
                    .content_base_url
                    .as_deref()
                    .unwrap_or(dropbox::DEFAULT_CONTENT_BASE_URL);
                Self::Dropbox(DropboxAdapter::with_base_urls(token, base_url, content))
            }
            Provider::GitHub => Self::GitHub(GitHubAdapter::with_base_url(token, base_url)),
        }
    }

    fn inner(&self) -> &dyn IProviderAdapter {
        match self {
            Self::GoogleDrive(a) => a,
            Self::OneDrive(a) => a,
            Self::Dropbox(a) => a,
            Self::GitHub(a) => a,
        }
    }
}

#[async_trait::async_trait]
impl IProviderAdapter for ProviderAdapter {
    fn provider(&self) -> Provider {
        self.inner().provider()
    }

    async fn list_tree(&self, root: &RootId) -> Result<RemoteTree, ProviderError> {
        self.inner().list_tree(root).await
    }

    async fn fetch_content(
        &self,
        root: &RootId,
        entry_id: &EntryId,
    ) -> Result<FetchedContent, ProviderError> {
        self.inner().fetch_content(root, entry_id).await
    }
}

//! Authenticated HTTP client shared by the provider adapters
//!
//! Wraps `reqwest::Client` with a base URL, bearer authentication, a
//! `User-Agent` header and the mapping of HTTP failures onto
//! [`ProviderError`]. Adapters build requests with [`ApiClient::request`]
//! (relative paths) or [`ApiClient::request_url`] (absolute URLs such as
//! paging links).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mirrorsync_providers::client::ApiClient;
//! use reqwest::Method;
//!
//! # async fn example() -> Result<(), mirrorsync_core::ports::ProviderError> {
//! let client = ApiClient::with_base_url("access-token", "https://api.github.com");
//! let response = client.send(client.request(Method::GET, "/rate_limit")).await?;
//! # Ok(())
//! # }
//! ```

use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use mirrorsync_core::ports::{ByteStream, FetchedContent, ProviderError};

/// Value sent in the `User-Agent` header (required by some APIs)
const USER_AGENT_VALUE: &str = concat!("mirrorsync/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in an error message
const MAX_ERROR_BODY: usize = 512;

/// HTTP client bound to one API host and one bearer token
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests, without a trailing slash
    base_url: String,
    /// OAuth2 access token
    access_token: String,
}

impl ApiClient {
    /// Creates a client for `base_url` authenticating with `access_token`
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::with_http_client(Client::new(), access_token, base_url)
    }

    /// Creates a client reusing an existing `reqwest::Client`
    pub fn with_http_client(
        client: Client,
        access_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns a reference to the current access token
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Creates an authenticated request builder for a path below the base URL
    ///
    /// `path` is appended verbatim, so callers must encode dynamic segments
    /// (see [`ApiClient::url_for`]).
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.authorized(self.client.request(method, url))
    }

    /// Creates an authenticated request builder for an absolute URL
    pub fn request_url(&self, method: Method, url: Url) -> RequestBuilder {
        self.authorized(self.client.request(method, url))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.access_token)
            .header(USER_AGENT, USER_AGENT_VALUE)
    }

    /// Builds `{base_url}/{fixed}/{segments...}` with each dynamic segment
    /// percent-encoded as a single path segment
    pub fn url_for(&self, fixed: &[&str], segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::InvalidResponse(format!("invalid base URL: {e}")))?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                ProviderError::InvalidResponse(format!(
                    "base URL cannot carry a path: {}",
                    self.base_url
                ))
            })?;
            path.pop_if_empty();
            path.extend(fixed.iter().copied());
            path.extend(segments.iter().copied());
        }
        Ok(url)
    }

    /// Sends a request, mapping transport failures and error statuses
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ProviderError> {
        let response = builder.send().await.map_err(network_error)?;
        check_status(response).await
    }

    /// Sends a request and parses a JSON body
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = self.send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

/// Maps a reqwest transport error
pub(crate) fn network_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Network(e.to_string())
}

/// Turns a non-success response into the matching [`ProviderError`]
pub async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let url = response.url().clone();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }

    debug!(status = status.as_u16(), url = %url, "Request failed");

    Err(match status {
        StatusCode::UNAUTHORIZED => ProviderError::Unauthorized(body),
        StatusCode::NOT_FOUND | StatusCode::GONE => ProviderError::NotFound(url.path().to_string()),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { retry_after },
        StatusCode::FORBIDDEN if retry_after.is_some() => ProviderError::RateLimited { retry_after },
        StatusCode::FORBIDDEN => ProviderError::Unauthorized(body),
        _ => ProviderError::Http {
            status: status.as_u16(),
            message: body,
        },
    })
}

/// Parses a `Retry-After` header given in seconds or as an HTTP date
pub fn parse_retry_after(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds);
    }

    match chrono::DateTime::parse_from_rfc2822(value) {
        Ok(date) => {
            let wait = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
            Some(u64::try_from(wait.num_seconds()).unwrap_or(0))
        }
        Err(_) => {
            warn!(value, "Could not parse Retry-After header");
            None
        }
    }
}

/// Converts a successful download response into [`FetchedContent`]
pub fn into_content(response: Response) -> FetchedContent {
    let declared_size = response.content_length();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let stream: ByteStream = response.bytes_stream().map(|chunk| chunk.map_err(network_error)).boxed();

    FetchedContent {
        stream,
        declared_size,
        content_type,
    }
}

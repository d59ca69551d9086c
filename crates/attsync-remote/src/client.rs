//! Confluence REST client
//!
//! A thin typed wrapper over the v1 content API for one page: its
//! attachments and its storage-format body. Every method makes a single
//! attempt and classifies failures into [`RemoteError`]; retrying belongs to
//! the sync engine's retry policy.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use attsync_remote::client::ConfluenceClient;
//!
//! # async fn example() -> Result<(), attsync_core::ports::RemoteError> {
//! let client = ConfluenceClient::new(
//!     "https://example.atlassian.net",
//!     "123456",
//!     "me@example.com",
//!     "api-token",
//!     Duration::from_secs(30),
//! )?;
//! for attachment in client.list_attachments().await? {
//!     println!("{} {}", attachment.id, attachment.title);
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use attsync_core::ports::RemoteError;
use reqwest::header::RETRY_AFTER;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::retry_after::parse_retry_after;

/// Attachments requested per listing page
pub const PAGE_SIZE: usize = 100;

/// Longest error body kept in an error message
const ERROR_BODY_LIMIT: usize = 500;

// ============================================================================
// Confluence API response types
// ============================================================================

/// An attachment as returned by the content API
#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    /// Content id, possibly with an `att` prefix
    pub id: String,
    /// File name
    pub title: String,
    #[serde(default)]
    pub version: Option<VersionInfo>,
    #[serde(default, rename = "_links")]
    pub links: AttachmentLinks,
}

impl Attachment {
    /// Numeric content id with any `att` prefix removed
    pub fn normalized_id(&self) -> String {
        normalize_content_id(&self.id).unwrap_or_else(|| self.id.trim().to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachmentLinks {
    /// Download path relative to `{base_url}/wiki`
    #[serde(default)]
    pub download: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct VersionInfo {
    pub number: u64,
}

/// Paged `results` envelope
#[derive(Debug, Deserialize)]
struct Results<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    title: String,
    version: VersionInfo,
    #[serde(default)]
    body: Option<PageBody>,
}

#[derive(Debug, Deserialize)]
struct PageBody {
    storage: Option<StorageValue>,
}

#[derive(Debug, Deserialize)]
struct StorageValue {
    value: String,
}

/// Current state of the target page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    pub title: String,
    /// Storage-format XHTML
    pub body: String,
    pub version: u64,
}

// ============================================================================
// ConfluenceClient
// ============================================================================

/// HTTP client bound to one Confluence page
///
/// Authenticates with basic auth (account e-mail and API token).
#[derive(Clone)]
pub struct ConfluenceClient {
    client: Client,
    base_url: String,
    page_id: String,
    email: String,
    api_token: String,
}

impl std::fmt::Debug for ConfluenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfluenceClient")
            .field("base_url", &self.base_url)
            .field("page_id", &self.page_id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl ConfluenceClient {
    /// Creates a client with its own connection pool and request timeout
    ///
    /// # Errors
    /// Returns [`RemoteError::Network`] if the TLS backend cannot be
    /// initialised
    pub fn new(
        base_url: impl Into<String>,
        page_id: impl Into<String>,
        email: impl Into<String>,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(
            client, base_url, page_id, email, api_token,
        ))
    }

    /// Creates a client around an existing `reqwest::Client` (useful for testing)
    pub fn with_http_client(
        client: Client,
        base_url: impl Into<String>,
        page_id: impl Into<String>,
        email: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_id: page_id.into(),
            email: email.into(),
            api_token: api_token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn page_id(&self) -> &str {
        &self.page_id
    }

    /// Creates an authenticated request for a path under `{base_url}/wiki`
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/wiki{}", self.base_url, path);
        self.client
            .request(method, url)
            .basic_auth(&self.email, Some(&self.api_token))
    }

    fn page_path(&self) -> String {
        format!("/rest/api/content/{}", self.page_id)
    }

    fn attachments_path(&self) -> String {
        format!("/rest/api/content/{}/child/attachment", self.page_id)
    }

    // ========================================================================
    // Attachments
    // ========================================================================

    /// Lists every attachment on the page, following `start` offsets
    #[instrument(skip(self), fields(page_id = %self.page_id))]
    pub async fn list_attachments(&self) -> Result<Vec<Attachment>, RemoteError> {
        let mut all = Vec::new();
        let mut start = 0usize;

        loop {
            let request = self.request(Method::GET, &self.attachments_path()).query(&[
                ("limit", PAGE_SIZE.to_string()),
                ("start", start.to_string()),
            ]);
            let page: Results<Attachment> = read_json(send(request).await?).await?;
            let count = page.results.len();
            all.extend(page.results);

            if count < PAGE_SIZE {
                break;
            }
            start += count;
        }

        debug!(count = all.len(), "Listed attachments");
        Ok(all)
    }

    /// Looks up an attachment by exact file name
    pub async fn find_attachment(&self, filename: &str) -> Result<Option<Attachment>, RemoteError> {
        let request = self
            .request(Method::GET, &self.attachments_path())
            .query(&[("filename", filename), ("limit", "1")]);
        let page: Results<Attachment> = read_json(send(request).await?).await?;
        Ok(page.results.into_iter().next())
    }

    /// Uploads `data` as `filename`, replacing the content of a same-named
    /// attachment when one exists
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn upload_attachment(
        &self,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<Attachment, RemoteError> {
        let existing = self.find_attachment(filename).await?;
        let path = match &existing {
            Some(attachment) => format!(
                "{}/{}/data",
                self.attachments_path(),
                attachment.normalized_id()
            ),
            None => self.attachments_path(),
        };
        debug!(
            filename,
            update = existing.is_some(),
            "Uploading attachment"
        );

        let part = Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str(mime_for(filename))
            .map_err(|e| RemoteError::BadRequest(format!("invalid mime type: {e}")))?;
        let request = self
            .request(Method::POST, &path)
            .header("X-Atlassian-Token", "nocheck")
            .multipart(Form::new().part("file", part));

        let text = send(request)
            .await?
            .text()
            .await
            .map_err(map_transport_error)?;
        let value = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| RemoteError::InvalidResponse(e.to_string()))?
        };
        match parse_upload_response(value) {
            Some(attachment) => Ok(attachment),
            // Some servers answer an update with an empty body
            None => existing.ok_or_else(|| {
                RemoteError::InvalidResponse(format!("upload of {filename} returned no attachment"))
            }),
        }
    }

    /// Deletes an attachment; a missing attachment counts as deleted
    #[instrument(skip(self))]
    pub async fn delete_attachment(&self, id: &str) -> Result<(), RemoteError> {
        let id = normalize_content_id(id).unwrap_or_else(|| id.to_string());
        let request = self.request(Method::DELETE, &format!("/rest/api/content/{id}"));
        match send(request).await {
            Ok(_) => Ok(()),
            Err(RemoteError::NotFound(_)) => {
                debug!(id = %id, "Attachment already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Downloads attachment content from its `_links.download` path
    pub async fn download(&self, download_path: &str) -> Result<Vec<u8>, RemoteError> {
        let response = send(self.request(Method::GET, download_path)).await?;
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        debug!(path = download_path, size = bytes.len(), "Downloaded attachment");
        Ok(bytes.to_vec())
    }

    // ========================================================================
    // Page
    // ========================================================================

    /// Fetches the page title, storage body and version number
    pub async fn get_page(&self) -> Result<PageContent, RemoteError> {
        let request = self
            .request(Method::GET, &self.page_path())
            .query(&[("expand", "body.storage,version")]);
        let page: PageResponse = read_json(send(request).await?).await?;
        Ok(PageContent {
            title: page.title,
            body: page
                .body
                .and_then(|b| b.storage)
                .map(|s| s.value)
                .unwrap_or_default(),
            version: page.version.number,
        })
    }

    /// Replaces the page body, bumping `current_version` by one
    #[instrument(skip(self, body), fields(page_id = %self.page_id, len = body.len()))]
    pub async fn update_page(
        &self,
        title: &str,
        body: &str,
        current_version: u64,
    ) -> Result<(), RemoteError> {
        let payload = json!({
            "type": "page",
            "title": title,
            "version": { "number": current_version + 1 },
            "body": {
                "storage": {
                    "value": body,
                    "representation": "storage",
                }
            }
        });
        send(self.request(Method::PUT, &self.page_path()).json(&payload)).await?;
        debug!(version = current_version + 1, "Page updated");
        Ok(())
    }
}

// ============================================================================
// Response handling
// ============================================================================

async fn send(request: RequestBuilder) -> Result<Response, RemoteError> {
    let response = request.send().await.map_err(map_transport_error)?;
    check_status(response).await
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    response
        .json()
        .await
        .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
}

/// Maps a non-success response onto the [`RemoteError`] taxonomy
pub async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = response.text().await.unwrap_or_default();

    Err(status_error(status, retry_after, &body))
}

fn status_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> RemoteError {
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("").to_string()
    } else {
        body.chars().take(ERROR_BODY_LIMIT).collect()
    };

    match status {
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized(message),
        StatusCode::FORBIDDEN => RemoteError::Forbidden(message),
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        StatusCode::CONFLICT => RemoteError::Conflict(message),
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited { retry_after },
        s if s.is_server_error() => RemoteError::Server {
            status: s.as_u16(),
            message,
        },
        s if s.is_client_error() => RemoteError::BadRequest(format!("{}: {message}", s.as_u16())),
        s => RemoteError::InvalidResponse(format!("unexpected status {}: {message}", s.as_u16())),
    }
}

fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout(error.to_string())
    } else if error.is_decode() {
        RemoteError::InvalidResponse(error.to_string())
    } else {
        RemoteError::Network(error.to_string())
    }
}

/// Accepts both `{"results": [attachment]}` and a bare attachment object
fn parse_upload_response(value: serde_json::Value) -> Option<Attachment> {
    let item = match value.get("results") {
        Some(serde_json::Value::Array(items)) => items.first()?.clone(),
        _ => value,
    };
    serde_json::from_value(item).ok()
}

/// Strips an `att` prefix and keeps only the digits of a content id
pub fn normalize_content_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let rest = trimmed.strip_prefix("att").unwrap_or(trimmed);
    let digits: String = rest.chars().filter(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

/// MIME type by file extension
pub fn mime_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "json" => "application/json",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

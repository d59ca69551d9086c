//! Shared test helpers for Confluence integration tests
//!
//! Each helper mounts mock endpoints on a wiremock server. The client
//! returned by [`setup_confluence_mock`] points at that server.

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use attsync_remote::client::ConfluenceClient;

pub const PAGE_ID: &str = "4242";
pub const EMAIL: &str = "bot@example.com";
pub const API_TOKEN: &str = "secret-token";

/// Starts a mock server and returns a (MockServer, ConfluenceClient) tuple
pub async fn setup_confluence_mock() -> (MockServer, ConfluenceClient) {
    let server = MockServer::start().await;
    let client = ConfluenceClient::with_http_client(
        reqwest::Client::new(),
        server.uri(),
        PAGE_ID,
        EMAIL,
        API_TOKEN,
    );
    (server, client)
}

pub fn attachments_path() -> String {
    format!("/wiki/rest/api/content/{PAGE_ID}/child/attachment")
}

pub fn page_path() -> String {
    format!("/wiki/rest/api/content/{PAGE_ID}")
}

pub fn download_path(title: &str) -> String {
    format!("/download/attachments/{PAGE_ID}/{title}")
}

/// Attachment JSON as the content API returns it
pub fn attachment_json(id: u64, title: &str, version: u64) -> Value {
    json!({
        "id": format!("att{id}"),
        "type": "attachment",
        "title": title,
        "version": { "number": version },
        "_links": { "download": format!("{}?version={version}", download_path(title)) }
    })
}

/// Mounts a single listing page at `start=0`
pub async fn mount_listing(server: &MockServer, items: Vec<Value>) {
    let size = items.len();
    Mock::given(method("GET"))
        .and(path(attachments_path()))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": items,
            "size": size,
        })))
        .mount(server)
        .await;
}

/// Mounts the find-by-filename lookup for `filename`
pub async fn mount_find(server: &MockServer, filename: &str, found: Option<Value>) {
    let results: Vec<Value> = found.into_iter().collect();
    Mock::given(method("GET"))
        .and(path(attachments_path()))
        .and(query_param("filename", filename))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": results })))
        .mount(server)
        .await;
}

/// Mounts the download endpoint for an attachment listed by [`attachment_json`]
pub async fn mount_download(server: &MockServer, title: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/wiki{}", download_path(title))))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(server)
        .await;
}

/// Mounts the page GET endpoint
pub async fn mount_page(server: &MockServer, title: &str, body: &str, version: u64) {
    Mock::given(method("GET"))
        .and(path(page_path()))
        .and(query_param("expand", "body.storage,version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": PAGE_ID,
            "type": "page",
            "title": title,
            "version": { "number": version },
            "body": { "storage": { "value": body, "representation": "storage" } }
        })))
        .mount(server)
        .await;
}

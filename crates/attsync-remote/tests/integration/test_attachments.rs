//! Integration tests for attachment listing, upload, delete and download

use std::time::Duration;

use attsync_core::domain::{AssetKey, RemoteId};
use attsync_core::ports::{IRemoteStore, RemoteError};
use attsync_remote::client::{ConfluenceClient, PAGE_SIZE};
use attsync_remote::ConfluenceAttachmentStore;
use serde_json::json;
use wiremock::matchers::{basic_auth, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, attachment_json, attachments_path, EMAIL, API_TOKEN};

fn key(s: &str) -> AssetKey {
    AssetKey::new(s.to_string()).unwrap()
}

fn id(s: &str) -> RemoteId {
    RemoteId::new(s.to_string()).unwrap()
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_follows_pagination() {
    let (server, client) = common::setup_confluence_mock().await;

    let first: Vec<_> = (0..PAGE_SIZE as u64)
        .map(|i| attachment_json(i + 1, &format!("img_{i}.png"), 1))
        .collect();
    common::mount_listing(&server, first).await;

    Mock::given(method("GET"))
        .and(path(attachments_path()))
        .and(query_param("start", "100"))
        .and(query_param("limit", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [attachment_json(500, "last.png", 3)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let attachments = client.list_attachments().await.expect("list failed");
    assert_eq!(attachments.len(), PAGE_SIZE + 1);
    assert_eq!(attachments.last().unwrap().title, "last.png");
}

#[tokio::test]
async fn test_list_sends_basic_auth() {
    let (server, client) = common::setup_confluence_mock().await;

    Mock::given(method("GET"))
        .and(path(attachments_path()))
        .and(basic_auth(EMAIL, API_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client.list_attachments().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_list_normalises_ids_and_has_no_fingerprint() {
    let (server, client) = common::setup_confluence_mock().await;
    common::mount_listing(
        &server,
        vec![
            attachment_json(101, "main_bg.png", 4),
            json!({ "id": "att102", "title": "", "_links": {} }),
        ],
    )
    .await;

    let store = ConfluenceAttachmentStore::new(client);
    let records = store.list().await.unwrap();

    // The attachment with an empty title is skipped
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, id("101"));
    assert_eq!(records[0].key, key("main_bg.png"));
    assert_eq!(records[0].version, Some(4));
    assert!(records[0].fingerprint.is_none());
}

// ============================================================================
// Upload
// ============================================================================

#[tokio::test]
async fn test_upload_creates_new_attachment() {
    let (server, client) = common::setup_confluence_mock().await;
    common::mount_find(&server, "new.png", None).await;

    Mock::given(method("POST"))
        .and(path(attachments_path()))
        .and(header("X-Atlassian-Token", "nocheck"))
        .and(body_string_contains("filename=\"new.png\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [attachment_json(7, "new.png", 1)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = ConfluenceAttachmentStore::new(client);
    let record = store.upload(&key("new.png"), b"png-bytes".to_vec()).await.unwrap();

    assert_eq!(record.id, id("7"));
    assert_eq!(record.key, key("new.png"));
    assert_eq!(record.version, Some(1));
}

#[tokio::test]
async fn test_upload_replaces_existing_attachment_by_id() {
    let (server, client) = common::setup_confluence_mock().await;
    common::mount_find(&server, "old.png", Some(attachment_json(5, "old.png", 2))).await;

    Mock::given(method("POST"))
        .and(path(format!("{}/5/data", attachments_path())))
        .and(header("X-Atlassian-Token", "nocheck"))
        .respond_with(ResponseTemplate::new(200).set_body_json(attachment_json(5, "old.png", 3)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(attachments_path()))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = ConfluenceAttachmentStore::new(client);
    let record = store.upload(&key("old.png"), b"v3".to_vec()).await.unwrap();

    assert_eq!(record.id, id("5"));
    assert_eq!(record.version, Some(3));
}

#[tokio::test]
async fn test_upload_update_with_empty_body_keeps_existing_id() {
    let (server, client) = common::setup_confluence_mock().await;
    common::mount_find(&server, "old.png", Some(attachment_json(5, "old.png", 2))).await;

    Mock::given(method("POST"))
        .and(path(format!("{}/5/data", attachments_path())))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let attachment = client.upload_attachment("old.png", b"v3".to_vec()).await.unwrap();
    assert_eq!(attachment.normalized_id(), "5");
}

#[tokio::test]
async fn test_upload_rejected_as_bad_request() {
    let (server, client) = common::setup_confluence_mock().await;
    common::mount_find(&server, "big.png", None).await;

    Mock::given(method("POST"))
        .and(path(attachments_path()))
        .respond_with(ResponseTemplate::new(413).set_body_string("too large"))
        .mount(&server)
        .await;

    let store = ConfluenceAttachmentStore::new(client);
    let err = store.upload(&key("big.png"), vec![0; 16]).await.unwrap_err();

    assert!(matches!(err, RemoteError::BadRequest(ref m) if m.contains("413")));
    assert!(err.is_fatal());
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_attachment() {
    let (server, client) = common::setup_confluence_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/wiki/rest/api/content/77"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = ConfluenceAttachmentStore::new(client);
    store.delete(&id("77")).await.expect("delete failed");
}

#[tokio::test]
async fn test_delete_missing_attachment_is_ok() {
    let (server, client) = common::setup_confluence_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/wiki/rest/api/content/78"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    client.delete_attachment("att78").await.expect("404 should count as deleted");
}

// ============================================================================
// Download
// ============================================================================

#[tokio::test]
async fn test_download_uses_link_from_listing() {
    let (server, client) = common::setup_confluence_mock().await;
    common::mount_listing(&server, vec![attachment_json(9, "a.png", 1)]).await;
    common::mount_download(&server, "a.png", b"alpha").await;

    let store = ConfluenceAttachmentStore::new(client);
    store.list().await.unwrap();
    assert_eq!(store.download(&id("9")).await.unwrap(), b"alpha");
}

#[tokio::test]
async fn test_download_refreshes_listing_when_link_unknown() {
    let (server, client) = common::setup_confluence_mock().await;
    common::mount_listing(&server, vec![attachment_json(9, "a.png", 1)]).await;
    common::mount_download(&server, "a.png", b"alpha").await;

    let store = ConfluenceAttachmentStore::new(client);
    assert_eq!(store.download(&id("9")).await.unwrap(), b"alpha");

    let err = store.download(&id("10")).await.unwrap_err();
    assert!(err.is_not_found());
}

// ============================================================================
// Error mapping
// ============================================================================

#[tokio::test]
async fn test_status_codes_map_to_remote_errors() {
    let cases = [
        (401, RemoteError::Unauthorized(String::new())),
        (403, RemoteError::Forbidden(String::new())),
        (409, RemoteError::Conflict(String::new())),
        (
            503,
            RemoteError::Server {
                status: 503,
                message: String::new(),
            },
        ),
    ];

    for (status, expected) in cases {
        let (server, client) = common::setup_confluence_mock().await;
        Mock::given(method("GET"))
            .and(path(attachments_path()))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = client.list_attachments().await.unwrap_err();
        assert_eq!(
            std::mem::discriminant(&err),
            std::mem::discriminant(&expected),
            "status {status} mapped to {err:?}"
        );
    }
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let (server, client) = common::setup_confluence_mock().await;
    Mock::given(method("GET"))
        .and(path(attachments_path()))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = client.list_attachments().await.unwrap_err();
    assert_eq!(
        err,
        RemoteError::RateLimited {
            retry_after: Some(Duration::from_secs(7))
        }
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_slow_response_is_a_timeout() {
    let (server, _) = common::setup_confluence_mock().await;
    Mock::given(method("GET"))
        .and(path(attachments_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "results": [] }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = ConfluenceClient::new(
        server.uri(),
        common::PAGE_ID,
        EMAIL,
        API_TOKEN,
        Duration::from_millis(200),
    )
    .unwrap();

    let err = client.list_attachments().await.unwrap_err();
    assert!(matches!(err, RemoteError::Timeout(_)), "{err:?}");
}

#[tokio::test]
async fn test_malformed_listing_is_invalid_response() {
    let (server, client) = common::setup_confluence_mock().await;
    Mock::given(method("GET"))
        .and(path(attachments_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let err = client.list_attachments().await.unwrap_err();
    assert!(matches!(err, RemoteError::InvalidResponse(_)), "{err:?}");
}

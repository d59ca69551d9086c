//! Integration tests for reading and publishing the gallery page

use attsync_core::domain::{AssetKey, HistoryEntry, Notes};
use attsync_core::ports::{IDocumentRenderer, IRemoteStore, RemoteError};
use attsync_remote::{ConfluenceAttachmentStore, GalleryRenderer};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, page_path};

#[tokio::test]
async fn test_get_page_reads_body_and_version() {
    let (server, client) = common::setup_confluence_mock().await;
    common::mount_page(&server, "Assets", "<p>old</p>", 12).await;

    let page = client.get_page().await.expect("get_page failed");
    assert_eq!(page.title, "Assets");
    assert_eq!(page.body, "<p>old</p>");
    assert_eq!(page.version, 12);
}

#[tokio::test]
async fn test_update_page_bumps_version() {
    let (server, client) = common::setup_confluence_mock().await;

    Mock::given(method("PUT"))
        .and(path(page_path()))
        .and(body_partial_json(json!({
            "type": "page",
            "title": "Assets",
            "version": { "number": 8 },
            "body": { "storage": { "value": "<p>new</p>", "representation": "storage" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client
        .update_page("Assets", "<p>new</p>", 7)
        .await
        .expect("update_page failed");
}

#[tokio::test]
async fn test_publish_renders_gallery_onto_page() {
    let (server, client) = common::setup_confluence_mock().await;
    common::mount_page(&server, "Assets", "", 3).await;

    let renderer = GalleryRenderer::new("Slot Assets");
    let keys = vec![
        AssetKey::new("main_bg.png".to_string()).unwrap(),
        AssetKey::new("layout_main.png".to_string()).unwrap(),
    ];
    let body = renderer.render(
        &renderer.classify(&keys),
        &[HistoryEntry::now("startup", 2, 0, 0, 0)],
        &Notes::new(),
    );

    Mock::given(method("PUT"))
        .and(path(page_path()))
        .and(body_partial_json(json!({
            "title": "Slot Assets",
            "version": { "number": 4 },
            "body": { "storage": { "value": body.clone() } }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = ConfluenceAttachmentStore::new(client);
    store
        .publish_document(&renderer.title(), &body)
        .await
        .expect("publish failed");
}

#[tokio::test]
async fn test_publish_skips_unchanged_page() {
    let (server, client) = common::setup_confluence_mock().await;
    common::mount_page(&server, "Assets", "<p>same</p>", 5).await;

    Mock::given(method("PUT"))
        .and(path(page_path()))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = ConfluenceAttachmentStore::new(client);
    store.publish_document("Assets", "<p>same</p>").await.unwrap();
}

#[tokio::test]
async fn test_publish_conflict_is_transient() {
    let (server, client) = common::setup_confluence_mock().await;
    common::mount_page(&server, "Assets", "", 5).await;

    Mock::given(method("PUT"))
        .and(path(page_path()))
        .respond_with(ResponseTemplate::new(409).set_body_string("version mismatch"))
        .mount(&server)
        .await;

    let store = ConfluenceAttachmentStore::new(client);
    let err = store.publish_document("Assets", "<p>x</p>").await.unwrap_err();
    assert_eq!(err, RemoteError::Conflict("version mismatch".into()));
    assert!(err.is_transient());
}

//! OneDrive adapter against a mocked Microsoft Graph API

use mirrorsync_core::domain::provider::ONEDRIVE_PACKAGE_MIME;
use mirrorsync_core::ports::{IProviderAdapter, ProviderError};
use mirrorsync_providers::onedrive::OneDriveAdapter;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_list_tree_follows_next_link() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me/drive/items/root-1/children"))
        .and(query_param("$skiptoken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [{
                "id": "nb",
                "name": "Notebook",
                "size": 0,
                "package": { "type": "oneNote" },
                "folder": { "childCount": 4 }
            }]
        })))
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/me/drive/items/root-1/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [
                {
                    "id": "d1",
                    "name": "Photos",
                    "size": 0,
                    "folder": { "childCount": 1 }
                },
                {
                    "id": "f1",
                    "name": "plan.docx",
                    "size": 4096,
                    "lastModifiedDateTime": "2024-05-01T08:00:00Z",
                    "file": {
                        "mimeType": "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                        "hashes": { "quickXorHash": "qx-1", "sha256Hash": "sha-1" }
                    }
                }
            ],
            "@odata.nextLink": format!("{}/me/drive/items/root-1/children?$skiptoken=p2", server.uri())
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/me/drive/items/d1/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [{
                "id": "f2",
                "name": "cat.jpg",
                "size": 900,
                "file": { "mimeType": "image/jpeg", "hashes": { "quickXorHash": "qx-2" } }
            }]
        })))
        .mount(&server)
        .await;

    let adapter = OneDriveAdapter::with_base_url(common::TOKEN, server.uri());
    let tree = adapter
        .list_tree(&common::root("root-1"))
        .await
        .expect("listing should succeed");

    // The package is a file-like unsupported entry, not a directory
    assert_eq!(tree.directories, vec!["Photos".to_string()]);
    assert_eq!(
        common::entry_paths(&tree),
        vec!["plan.docx", "Notebook", "Photos/cat.jpg"]
    );
    assert_eq!(tree.entries[0].content_fingerprint.as_deref(), Some("sha-1"));
    assert_eq!(tree.entries[1].mime_type, ONEDRIVE_PACKAGE_MIME);
    assert_eq!(tree.entries[2].content_fingerprint.as_deref(), Some("qx-2"));
}

#[tokio::test]
async fn test_fetch_content() {
    let server = MockServer::start().await;
    let body = vec![7u8; 3000];

    Mock::given(method("GET"))
        .and(path("/me/drive/items/f1/content"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let adapter = OneDriveAdapter::with_base_url(common::TOKEN, server.uri());
    let content = adapter
        .fetch_content(&common::root("root-1"), &common::entry("f1"))
        .await
        .unwrap();

    assert_eq!(content.declared_size, Some(3000));
    assert_eq!(common::read_all(content).await, body);
}

#[tokio::test]
async fn test_server_error_maps_to_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/me/drive/items/root-1/children"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let adapter = OneDriveAdapter::with_base_url(common::TOKEN, server.uri());
    let err = adapter.list_tree(&common::root("root-1")).await.unwrap_err();
    assert!(matches!(
        err,
        ProviderError::Http { status: 503, ref message } if message == "maintenance"
    ));
}

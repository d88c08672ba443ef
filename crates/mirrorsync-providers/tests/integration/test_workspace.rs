//! Workspace replicator against a mocked workspace service

use std::time::Duration;

use mirrorsync_core::domain::{Provider, WorkspaceId};
use mirrorsync_core::ports::{IWorkspaceReplicator, PullSignal, ReplicationError, WorkspaceSession};
use mirrorsync_providers::HttpWorkspaceReplicator;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

fn replicator(server: &MockServer) -> HttpWorkspaceReplicator {
    HttpWorkspaceReplicator::new(server.uri(), common::TOKEN, Duration::from_millis(500))
}

fn ws() -> WorkspaceId {
    WorkspaceId::new("team-42".to_string()).unwrap()
}

fn session() -> WorkspaceSession {
    WorkspaceSession {
        id: "sess-1".to_string(),
    }
}

#[tokio::test]
async fn test_active_session_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/workspaces/team-42/session"))
        .and(header("Authorization", common::bearer().as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "sessionId": "sess-1" })),
        )
        .mount(&server)
        .await;

    let found = replicator(&server).active_session(&ws()).await.unwrap();
    assert_eq!(found, Some(session()));
}

#[tokio::test]
async fn test_no_active_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/workspaces/team-42/session"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert_eq!(replicator(&server).active_session(&ws()).await.unwrap(), None);
}

#[tokio::test]
async fn test_signal_pull_posts_signal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions/sess-1/pull-mirror"))
        .and(body_json(serde_json::json!({
            "provider": "dropbox",
            "workspaceId": "team-42",
            "rootName": "Team Folder"
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let signal = PullSignal {
        provider: Provider::Dropbox,
        workspace_id: ws(),
        root_name: "Team Folder".to_string(),
    };
    replicator(&server)
        .signal_pull(&session(), &signal)
        .await
        .expect("signal should be accepted");
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/workspaces/team-42/session"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = replicator(&server).active_session(&ws()).await.unwrap_err();
    assert!(matches!(err, ReplicationError::Transient(_)));
}

#[tokio::test]
async fn test_rejected_signal_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions/sess-1/pull-mirror"))
        .respond_with(ResponseTemplate::new(403).set_body_string("session closed"))
        .mount(&server)
        .await;

    let signal = PullSignal {
        provider: Provider::GitHub,
        workspace_id: ws(),
        root_name: "octo/widgets".to_string(),
    };
    let err = replicator(&server)
        .signal_pull(&session(), &signal)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ReplicationError::Permanent("HTTP 403: session closed".to_string())
    );
}

#[tokio::test]
async fn test_timeout_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/workspaces/team-42/session"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "sessionId": "late" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = replicator(&server).active_session(&ws()).await.unwrap_err();
    assert!(matches!(err, ReplicationError::Transient(_)));
}

//! Session lifecycle against a fake device.

mod common;

use std::time::Duration;

use wiremock::MockServer;

use bigscan::core::device::Device;
use bigscan::core::session::{SessionConfig, SessionManager};
use bigscan::core::http::build_client;
use bigscan::error::ScanError;

use common::fixtures::{
    PASSWORD, TOKEN_PATH, count_requests, credential, device_for, mount_login,
    mount_login_rejected, mount_logout, mount_token_ops, session_manager,
};
use common::logger::TestLogger;

#[tokio::test]
async fn open_returns_token_session() {
    let (log, capture) = TestLogger::with_capture("open_returns_token_session");
    log.phase("setup");
    let server = MockServer::start().await;
    mount_login(&server).await;

    log.phase("execute");
    let sessions = session_manager();
    let session = sessions
        .open(&device_for(&server), &credential())
        .await
        .expect("login succeeds");

    log.phase("verify");
    assert_eq!(session.window(), Duration::from_secs(1200));
    assert!(session.expires_at() > session.issued_at());
    assert_eq!(session.extension_failures(), 0);
    capture.assert_logged("Opening session");
    capture.assert_never_logged(PASSWORD);
    log.finish_ok();
}

#[tokio::test]
async fn rejected_login_is_auth_error() {
    let log = TestLogger::new("rejected_login_is_auth_error");
    let server = MockServer::start().await;
    mount_login_rejected(&server, 401).await;

    let err = session_manager()
        .open(&device_for(&server), &credential())
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::AuthRejected { status: 401, .. }), "{err:?}");
    assert_eq!(err.error_code(), "BIGSCAN-A002");
    log.finish_ok();
}

#[tokio::test]
async fn login_without_token_is_parse_error() {
    let log = TestLogger::new("login_without_token_is_parse_error");
    let server = MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .respond_with(
            wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": {} })),
        )
        .mount(&server)
        .await;

    let err = session_manager()
        .open(&device_for(&server), &credential())
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::ParseResponse { .. }), "{err:?}");
    log.finish_ok();
}

#[tokio::test]
async fn unreachable_device_is_connectivity_error() {
    let log = TestLogger::new("unreachable_device_is_connectivity_error");
    // Nothing listens on port 1.
    let device = Device::parse("http://127.0.0.1:1").unwrap();
    let sessions = SessionManager::new(
        build_client(Duration::from_secs(2)).unwrap(),
        SessionConfig::default(),
    );

    let err = sessions.open(&device, &credential()).await.unwrap_err();
    log.debug(&format!("error: {err}"));
    assert!(err.is_connectivity(), "{err:?}");
    log.finish_ok();
}

#[tokio::test]
async fn extend_patches_token() {
    let log = TestLogger::new("extend_patches_token");
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_token_ops(&server).await;

    let sessions = session_manager();
    let mut session = sessions
        .open(&device_for(&server), &credential())
        .await
        .unwrap();
    let before = session.expires_at();
    assert!(sessions.extend(&mut session).await);

    assert_eq!(count_requests(&server, "PATCH", TOKEN_PATH).await, 1);
    assert!(session.expires_at() >= before);
    log.finish_ok();
}

#[tokio::test]
async fn failed_extend_is_counted_not_raised() {
    let log = TestLogger::new("failed_extend_is_counted_not_raised");
    let server = MockServer::start().await;
    mount_login(&server).await;
    // No PATCH mock: the server answers 404.

    let sessions = session_manager();
    let mut session = sessions
        .open(&device_for(&server), &credential())
        .await
        .unwrap();
    assert!(!sessions.extend(&mut session).await);
    assert_eq!(session.extension_failures(), 1);
    assert!(session.last_extension_error().is_some());
    log.finish_ok();
}

#[tokio::test]
async fn close_deletes_token_once() {
    let log = TestLogger::new("close_deletes_token_once");
    let server = MockServer::start().await;
    mount_login(&server).await;
    mount_logout(&server, Some(1)).await;

    let sessions = session_manager();
    let session = sessions
        .open(&device_for(&server), &credential())
        .await
        .unwrap();
    sessions.close(session).await;
    log.finish_ok();
}

#[tokio::test]
async fn close_tolerates_logout_errors() {
    let (log, capture) = TestLogger::with_capture("close_tolerates_logout_errors");
    let server = MockServer::start().await;
    mount_login(&server).await;
    wiremock::Mock::given(wiremock::matchers::method("DELETE"))
        .respond_with(wiremock::ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let sessions = session_manager();
    let session = sessions
        .open(&device_for(&server), &credential())
        .await
        .unwrap();
    sessions.close(session).await;
    capture.assert_logged("Logout returned error status");
    log.finish_ok();
}

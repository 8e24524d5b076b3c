#![allow(dead_code)]

//! A fake BIG-IP built on wiremock, plus factories for the scan types.
//!
//! ```rust,ignore
//! let server = MockServer::start().await;
//! mount_login(&server).await;
//! mount_token_ops(&server).await;
//! mount_facts(&server).await;
//! let device = device_for(&server);
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use bigscan::core::capture::{CaptureConfig, CaptureKind};
use bigscan::core::credentials::Credential;
use bigscan::core::device::Device;
use bigscan::core::http::build_client;
use bigscan::core::session::{AUTH_HEADER, SessionConfig, SessionManager};

pub const TOKEN: &str = "tok-123";
pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "s3cret-pw";
pub const HOSTNAME: &str = "bigip1.lab.local";

pub const LOGIN: &str = "/mgmt/shared/authn/login";
pub const TOKEN_PATH: &str = "/mgmt/shared/authz/tokens/tok-123";

pub const QKVIEW_ID: &str = "qk-42";
pub const QKVIEW_TASK: &str = "/mgmt/cm/autodeploy/qkview/qk-42";
pub const QKVIEW_DOWNLOAD: &str = "/mgmt/cm/autodeploy/qkview-download/fixture.qkview";
pub const UNIX_RM: &str = "/mgmt/tm/util/unix-rm";

pub const UCS_ID: &str = "1700000000";
pub const UCS_TASK: &str = "/mgmt/tm/task/sys/ucs/1700000000";

// =============================================================================
// Factories
// =============================================================================

/// Device pointing at the mock server over plain HTTP.
pub fn device_for(server: &MockServer) -> Device {
    Device::parse(&server.uri()).expect("mock uri parses")
}

pub fn credential() -> Credential {
    Credential::new(USERNAME, PASSWORD)
}

pub fn session_manager() -> SessionManager {
    session_manager_with(SessionConfig::default())
}

pub fn session_manager_with(config: SessionConfig) -> SessionManager {
    let client = build_client(Duration::from_secs(5)).expect("client builds");
    SessionManager::new(
        client,
        SessionConfig {
            request_timeout: Duration::from_secs(5),
            ..config
        },
    )
}

/// Capture settings fast enough for tests, writing into `dir`.
pub fn fast_capture(kind: CaptureKind, dir: &Path) -> CaptureConfig {
    CaptureConfig {
        poll_interval: Duration::from_millis(40),
        timeout: Duration::from_secs(3),
        output_dir: dir.to_path_buf(),
        chunk_size: 4,
        ..CaptureConfig::for_kind(kind)
    }
}

// =============================================================================
// Session endpoints
// =============================================================================

pub async fn mount_login(server: &MockServer) {
    mount_login_with_window(server, 1200).await;
}

pub async fn mount_login_with_window(server: &MockServer, timeout_secs: u64) {
    mount_login_for(server, USERNAME, timeout_secs).await;
}

/// Login that only accepts `username`; anyone else gets a 404.
pub async fn mount_login_for(server: &MockServer, username: &str, timeout_secs: u64) {
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .and(body_partial_json(json!({
            "username": username,
            "loginProviderName": "tmos",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "username": username,
            "loginProviderName": "tmos",
            "token": {
                "token": TOKEN,
                "name": TOKEN,
                "timeout": timeout_secs,
                "userName": username,
            }
        })))
        .mount(server)
        .await;
}

pub async fn mount_login_rejected(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "code": status,
            "message": "Authentication failed.",
            "errorStack": [],
        })))
        .mount(server)
        .await;
}

/// Token extension (PATCH) and logout (DELETE), both accepted.
pub async fn mount_token_ops(server: &MockServer) {
    Mock::given(method("PATCH"))
        .and(path(TOKEN_PATH))
        .and(header(AUTH_HEADER, TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": TOKEN })))
        .mount(server)
        .await;
    mount_logout(server, None).await;
}

/// Logout, optionally with an exact call count verified on drop.
pub async fn mount_logout(server: &MockServer, times: Option<u64>) {
    let mock = Mock::given(method("DELETE"))
        .and(path(TOKEN_PATH))
        .and(header(AUTH_HEADER, TOKEN))
        .respond_with(ResponseTemplate::new(200));
    let mock = match times {
        Some(n) => mock.expect(n),
        None => mock,
    };
    mock.mount(server).await;
}

/// Token validity as the device sees it: good for `lifetime` after login or
/// the last PATCH.
#[derive(Debug, Clone)]
pub struct TokenClock {
    touched: Arc<Mutex<Instant>>,
    lifetime: Duration,
}

impl TokenClock {
    fn touch(&self) {
        *self.touched.lock().unwrap() = Instant::now();
    }

    #[must_use]
    pub fn valid(&self) -> bool {
        self.touched.lock().unwrap().elapsed() < self.lifetime
    }
}

fn expired() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({ "code": 401, "message": "token expired" }))
}

/// Restarts the token clock, then answers with the template. An extension
/// that arrives after the token lapsed is refused.
struct Refresh {
    clock: TokenClock,
    reply: ResponseTemplate,
    is_login: bool,
}

impl Respond for Refresh {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if !self.is_login && !self.clock.valid() {
            return expired();
        }
        self.clock.touch();
        self.reply.clone()
    }
}

/// Answers with the template while the token is valid, 401 after.
pub struct WhileValid(pub TokenClock, pub ResponseTemplate);

impl Respond for WhileValid {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.0.valid() {
            self.1.clone()
        } else {
            expired()
        }
    }
}

/// Login, PATCH and DELETE for a token the device drops after `lifetime`.
pub async fn mount_expiring_token(server: &MockServer, lifetime: Duration) -> TokenClock {
    let clock = TokenClock {
        touched: Arc::new(Mutex::new(Instant::now())),
        lifetime,
    };
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(Refresh {
            clock: clock.clone(),
            reply: ResponseTemplate::new(200).set_body_json(json!({
                "token": { "token": TOKEN, "timeout": lifetime.as_secs() }
            })),
            is_login: true,
        })
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(TOKEN_PATH))
        .respond_with(Refresh {
            clock: clock.clone(),
            reply: ResponseTemplate::new(200).set_body_json(json!({ "token": TOKEN })),
            is_login: false,
        })
        .mount(server)
        .await;
    mount_logout(server, None).await;
    clock
}

// =============================================================================
// Inventory facts
// =============================================================================

pub async fn mount_facts(server: &MockServer) {
    let facts: [(&str, Value); 5] = [
        ("/mgmt/tm/sys/global-settings", json!({ "hostname": HOSTNAME })),
        ("/mgmt/tm/sys/hardware", hardware_stats()),
        ("/mgmt/tm/sys/license", license_stats()),
        ("/mgmt/tm/sys/software/volume", json!({
            "items": [
                { "name": "HD1.1", "version": "16.1.3", "product": "BIG-IP", "active": true },
                { "name": "HD1.2", "version": "15.1.8", "product": "BIG-IP" }
            ]
        })),
        ("/mgmt/tm/sys/failover", json!({ "status": "ACTIVE" })),
    ];
    for (p, body) in facts {
        Mock::given(method("GET"))
            .and(path(p))
            .and(header(AUTH_HEADER, TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}

fn hardware_stats() -> Value {
    json!({
        "kind": "tm:sys:hardware:hardwarestats",
        "entries": {
            "https://localhost/mgmt/tm/sys/hardware/system-info": {
                "nestedStats": { "entries": {
                    "https://localhost/mgmt/tm/sys/hardware/system-info/0": {
                        "nestedStats": { "entries": {
                            "bigipChassisSerialNum": { "description": "f5-abcd-1234" },
                            "platform": { "description": "Z100" }
                        }}
                    }
                }}
            }
        }
    })
}

fn license_stats() -> Value {
    json!({
        "entries": {
            "https://localhost/mgmt/tm/sys/license/0": {
                "nestedStats": { "entries": {
                    "registrationKey": { "description": "ABCDE-FGHIJ-KLMNO-PQRST-UVWXYZZ" }
                }}
            }
        }
    })
}

// =============================================================================
// QKView task
// =============================================================================

pub async fn mount_qkview_create(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/mgmt/cm/autodeploy/qkview"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "id": QKVIEW_ID,
            "status": "CREATED",
        })))
        .mount(server)
        .await;
}

/// Status polls answer `status`; `times` limits how many polls this mock
/// serves before later mocks take over.
pub async fn mount_qkview_status(server: &MockServer, status: &str, times: Option<u64>) {
    let mut body = json!({ "id": QKVIEW_ID, "status": status });
    if status == "SUCCEEDED" {
        body["qkviewUri"] = json!(format!("https://localhost{QKVIEW_DOWNLOAD}"));
    }
    if status == "FAILED" {
        body["message"] = json!("qkview generation failed: disk full");
    }
    let mock = Mock::given(method("GET"))
        .and(path(QKVIEW_TASK))
        .respond_with(ResponseTemplate::new(200).set_body_json(body));
    let mock = match times {
        Some(n) => mock.up_to_n_times(n),
        None => mock,
    };
    mock.mount(server).await;
}

/// Remote cleanup: task DELETE and `unix-rm`, each expected exactly once.
pub async fn mount_qkview_cleanup(server: &MockServer) {
    Mock::given(method("DELETE"))
        .and(path(QKVIEW_TASK))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(UNIX_RM))
        .and(body_partial_json(json!({ "command": "run" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "kind": "tm:util:unix-rm:runstate" })))
        .expect(1)
        .mount(server)
        .await;
}

/// Serve `payload` in ranges the way the file-transfer endpoints do.
pub async fn mount_chunked_download(server: &MockServer, download_path: &str, payload: &[u8], chunk: usize) {
    let total = payload.len();
    let mut start = 0;
    let mut known = false;
    while start < total {
        let end = (start + chunk).min(total) - 1;
        // Until the size is known the client asks for a full chunk.
        let request_range = if known {
            format!("{start}-{end}/{total}")
        } else {
            format!("{start}-{}/0", start + chunk - 1)
        };
        Mock::given(method("GET"))
            .and(path(download_path))
            .and(header("Content-Range", request_range.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Range", format!("{start}-{end}/{total}").as_str())
                    .set_body_bytes(payload[start..=end].to_vec()),
            )
            .mount(server)
            .await;
        start = end + 1;
        known = true;
    }
}

// =============================================================================
// UCS task
// =============================================================================

pub async fn mount_ucs_create(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/mgmt/tm/task/sys/ucs"))
        .and(body_partial_json(json!({ "command": "save" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_taskId": UCS_ID,
            "_taskState": "CREATED",
        })))
        .mount(server)
        .await;
}

/// The start request, expected exactly once.
pub async fn mount_ucs_start(server: &MockServer) {
    Mock::given(method("PUT"))
        .and(path(UCS_TASK))
        .and(body_partial_json(json!({ "_taskState": "VALIDATING" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_taskId": UCS_ID,
            "_taskState": "VALIDATING",
        })))
        .expect(1)
        .mount(server)
        .await;
}

pub async fn mount_ucs_status(server: &MockServer, state: &str, times: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path(UCS_TASK))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_taskId": UCS_ID,
            "_taskState": state,
        })));
    let mock = match times {
        Some(n) => mock.up_to_n_times(n),
        None => mock,
    };
    mock.mount(server).await;
}

pub async fn mount_ucs_download(server: &MockServer, payload: &[u8]) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/mgmt/shared/file-transfer/ucs-downloads/.+\.ucs$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.to_vec()))
        .mount(server)
        .await;
}

pub async fn mount_ucs_cleanup(server: &MockServer) {
    Mock::given(method("DELETE"))
        .and(path(UCS_TASK))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("DELETE"))
        .and(path_regex(r"^/mgmt/tm/sys/ucs/.+\.ucs$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(server)
        .await;
}

// =============================================================================
// Inspection
// =============================================================================

/// Requests the server saw with this method and path.
pub async fn count_requests(server: &MockServer, verb: &str, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == request_path)
        .count()
}

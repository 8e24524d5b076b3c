//! Token sessions against the iControl REST API.
//!
//! [`SessionManager::open`] trades a [`Credential`] for an auth token,
//! [`SessionManager::extend`] pushes the token's lifetime forward while long
//! captures are polled, and [`SessionManager::close`] revokes it. `close`
//! takes the session by value, so a session cannot be closed twice or used
//! after logout.

use std::time::{Duration, Instant};

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};

use crate::core::credentials::Credential;
use crate::core::device::Device;
use crate::core::http::{classify_transport, status_error};
use crate::error::{Result, ScanError};

pub const AUTH_HEADER: &str = "X-F5-Auth-Token";
const LOGIN_PATH: &str = "/mgmt/shared/authn/login";
const TOKENS_PATH: &str = "/mgmt/shared/authz/tokens";

/// Longest token lifetime the REST API accepts, in seconds.
pub const MAX_TOKEN_TIMEOUT_SECS: u64 = 36_000;

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Window assumed when the login response omits `token.timeout`.
    pub default_window: Duration,
    /// Fraction of the window after which a keep-alive is due. In (0, 1).
    pub extend_fraction: f64,
    /// Per-request timeout, reported in timeout errors.
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_window: Duration::from_secs(1200),
            extend_fraction: 0.5,
            request_timeout: crate::core::http::DEFAULT_TIMEOUT,
        }
    }
}

/// An authenticated session with one device.
#[derive(Debug)]
pub struct Session {
    host: String,
    base_url: String,
    token: String,
    client: Client,
    request_timeout: Duration,
    issued_at: Instant,
    expires_at: Instant,
    window: Duration,
    last_extended: Instant,
    extension_failures: u32,
    last_extension_error: Option<String>,
}

impl Session {
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn issued_at(&self) -> Instant {
        self.issued_at
    }

    /// When the device will stop accepting the token, as far as we know.
    #[must_use]
    pub const fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Token lifetime granted per login or extension.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub const fn extension_failures(&self) -> u32 {
        self.extension_failures
    }

    #[must_use]
    pub fn last_extension_error(&self) -> Option<&str> {
        self.last_extension_error.as_deref()
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Request builder carrying the auth token.
    ///
    /// # Errors
    ///
    /// [`ScanError::SessionExpired`] if the session holds no token.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        if self.token.is_empty() {
            return Err(ScanError::SessionExpired {
                host: self.host.clone(),
            });
        }
        Ok(self
            .client
            .request(method, self.url(path))
            .header(AUTH_HEADER, &self.token))
    }

    /// Send an authenticated request. Transport failures are classified and
    /// a 401 becomes [`ScanError::SessionExpired`]; other statuses are left to
    /// the caller.
    ///
    /// # Errors
    ///
    /// Network variants on transport failure, `SessionExpired` on 401.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| classify_transport(&self.host, &e, self.request_timeout))?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ScanError::SessionExpired {
                host: self.host.clone(),
            });
        }
        Ok(response)
    }

    /// GET and decode a JSON body.
    ///
    /// # Errors
    ///
    /// As [`Session::send`], plus `DeviceApi` on non-2xx and `ParseResponse`
    /// on a body that is not JSON.
    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self.send(self.request(Method::GET, path)?).await?;
        self.json_body(response).await
    }

    /// POST a JSON body and decode the JSON reply.
    ///
    /// # Errors
    ///
    /// As [`Session::get_json`].
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .send(self.request(Method::POST, path)?.json(body))
            .await?;
        self.json_body(response).await
    }

    /// PUT a JSON body and decode the JSON reply.
    ///
    /// # Errors
    ///
    /// As [`Session::get_json`].
    pub async fn put_json(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .send(self.request(Method::PUT, path)?.json(body))
            .await?;
        self.json_body(response).await
    }

    /// DELETE a resource. 404 counts as already gone.
    ///
    /// # Errors
    ///
    /// As [`Session::send`], plus `DeviceApi` on other non-2xx statuses.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let response = self.send(self.request(Method::DELETE, path)?).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(status_error(&self.host, response).await)
        }
    }

    async fn json_body(&self, response: Response) -> Result<Value> {
        if !response.status().is_success() {
            return Err(status_error(&self.host, response).await);
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| ScanError::ParseResponse {
                host: self.host.clone(),
                message: e.to_string(),
            })
    }
}

/// Opens, extends and closes device sessions.
#[derive(Debug, Clone)]
pub struct SessionManager {
    client: Client,
    config: SessionConfig,
}

impl SessionManager {
    #[must_use]
    pub const fn new(client: Client, config: SessionConfig) -> Self {
        Self { client, config }
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Log in and return a session holding a fresh token.
    ///
    /// # Errors
    ///
    /// [`ScanError::AuthRejected`] on 401/403, a network variant when the
    /// device cannot be reached, `DeviceApi`/`ParseResponse` for anything
    /// else unexpected.
    pub async fn open(&self, device: &Device, credential: &Credential) -> Result<Session> {
        let host = device.host();
        tracing::info!(host, username = %credential.username, "Opening session");

        let body = json!({
            "username": credential.username,
            "password": credential.password(),
            "loginProviderName": "tmos",
        });
        let response = self
            .client
            .post(format!("{}{LOGIN_PATH}", device.base_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(host, &e, self.config.request_timeout))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(host, status = status.as_u16(), "Login rejected");
            return Err(ScanError::AuthRejected {
                host: host.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(status_error(host, response).await);
        }

        let payload: Value = response.json().await.map_err(|e| ScanError::ParseResponse {
            host: host.to_string(),
            message: e.to_string(),
        })?;
        let token = payload
            .pointer("/token/token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ScanError::ParseResponse {
                host: host.to_string(),
                message: "login response has no token".to_string(),
            })?
            .to_string();
        let window = payload
            .pointer("/token/timeout")
            .and_then(Value::as_u64)
            .filter(|secs| *secs > 0)
            .map_or(self.config.default_window, Duration::from_secs);

        let now = Instant::now();
        tracing::debug!(host, window_secs = window.as_secs(), "Session open");
        Ok(Session {
            host: host.to_string(),
            base_url: device.base_url().to_string(),
            token,
            client: self.client.clone(),
            request_timeout: self.config.request_timeout,
            issued_at: now,
            expires_at: now + window,
            window,
            last_extended: now,
            extension_failures: 0,
            last_extension_error: None,
        })
    }

    /// Keep-alive: ask the device to keep the token valid for another full
    /// window from now.
    ///
    /// Never fails the caller. A failed extension is counted on the session
    /// and logged; if the token really lapses, the next request surfaces
    /// [`ScanError::SessionExpired`]. Returns whether the extension stuck.
    ///
    /// Once the token's total lifetime would pass [`MAX_TOKEN_TIMEOUT_SECS`]
    /// no request is sent and the attempt counts as a failed extension.
    pub async fn extend(&self, session: &mut Session) -> bool {
        let now = Instant::now();
        let lifetime = now.duration_since(session.issued_at) + session.window;
        if lifetime.as_secs() > MAX_TOKEN_TIMEOUT_SECS {
            session.extension_failures += 1;
            session.last_extension_error = Some(format!(
                "token lifetime would exceed {MAX_TOKEN_TIMEOUT_SECS}s"
            ));
            tracing::warn!(
                host = %session.host,
                lifetime_secs = lifetime.as_secs(),
                failures = session.extension_failures,
                "Session cannot be extended past the maximum token lifetime"
            );
            return false;
        }
        let timeout_secs = lifetime.as_secs().max(1);
        let path = format!("{TOKENS_PATH}/{}", session.token);

        let result = match session.request(Method::PATCH, &path) {
            Ok(request) => match session
                .send(request.json(&json!({ "timeout": timeout_secs })))
                .await
            {
                Ok(response) if response.status().is_success() => Ok(()),
                Ok(response) => Err(status_error(&session.host, response).await),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                session.expires_at = session.issued_at + Duration::from_secs(timeout_secs);
                session.last_extended = now;
                tracing::debug!(host = %session.host, timeout_secs, "Session extended");
                true
            }
            Err(e) => {
                session.extension_failures += 1;
                session.last_extension_error = Some(e.to_string());
                tracing::warn!(
                    host = %session.host,
                    failures = session.extension_failures,
                    error = %e,
                    "Session extension failed"
                );
                false
            }
        }
    }

    /// Whether a keep-alive is due at `now`.
    #[must_use]
    pub fn refresh_due(&self, session: &Session, now: Instant) -> bool {
        let threshold = session.window.mul_f64(self.config.extend_fraction);
        now.saturating_duration_since(session.last_extended) >= threshold
    }

    /// Time left at `now` before a keep-alive is due; zero once it is.
    #[must_use]
    pub fn until_refresh(&self, session: &Session, now: Instant) -> Duration {
        let threshold = session.window.mul_f64(self.config.extend_fraction);
        threshold.saturating_sub(now.saturating_duration_since(session.last_extended))
    }

    /// Extend if a keep-alive is due. Returns whether an extension was sent.
    pub async fn keep_alive(&self, session: &mut Session) -> bool {
        if self.refresh_due(session, Instant::now()) {
            self.extend(session).await;
            true
        } else {
            false
        }
    }

    /// Revoke the token. Best effort: failures are logged, never returned.
    pub async fn close(&self, session: Session) {
        let path = format!("{TOKENS_PATH}/{}", session.token);
        let outcome = match session.request(Method::DELETE, &path) {
            Ok(request) => session.send(request).await.map(|r| r.status()),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(status) if status.is_success() || status == StatusCode::NOT_FOUND => {
                tracing::debug!(host = %session.host, "Session closed");
            }
            Ok(status) => {
                tracing::warn!(host = %session.host, status = status.as_u16(), "Logout returned error status");
            }
            Err(e) => {
                tracing::warn!(host = %session.host, error = %e, "Logout failed");
            }
        }
    }
}

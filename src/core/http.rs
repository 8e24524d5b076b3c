//! HTTP client utilities.
//!
//! One client is built per run and cloned into each device session
//! (`reqwest::Client` is a cheap handle). Management interfaces ship with
//! self-signed certificates, so certificate validation is off.

use std::error::Error as _;
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Response};

use crate::error::{Result, ScanError};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .danger_accept_invalid_certs(true)
        .user_agent(format!("bigscan/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ScanError::Network {
            host: "-".to_string(),
            message: e.to_string(),
        })
}

/// Map a transport-level `reqwest` failure onto the network error variants.
///
/// reqwest only exposes `is_timeout`/`is_connect`; DNS, TLS and refused
/// connections are told apart by walking the source chain.
#[must_use]
pub fn classify_transport(host: &str, err: &reqwest::Error, timeout: Duration) -> ScanError {
    if err.is_timeout() {
        return ScanError::RequestTimeout {
            host: host.to_string(),
            seconds: timeout.as_secs(),
        };
    }

    let chain = source_chain(err).to_lowercase();
    if chain.contains("dns error")
        || chain.contains("failed to lookup address")
        || chain.contains("name or service not known")
        || chain.contains("no such host")
    {
        ScanError::DnsFailure {
            host: host.to_string(),
        }
    } else if chain.contains("connection refused") {
        ScanError::ConnectionRefused {
            host: host.to_string(),
        }
    } else if chain.contains("tls") || chain.contains("certificate") || chain.contains("handshake")
    {
        ScanError::TlsFailure {
            host: host.to_string(),
            message: err.to_string(),
        }
    } else {
        ScanError::Network {
            host: host.to_string(),
            message: chain,
        }
    }
}

fn source_chain(err: &reqwest::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

/// Turn a non-success response into `DeviceApi`, keeping a short body excerpt.
pub async fn status_error(host: &str, response: Response) -> ScanError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ScanError::DeviceApi {
        host: host.to_string(),
        status,
        message: excerpt(&body),
    }
}

/// BIG-IP error bodies are JSON `{"code":..,"message":..}`; fall back to raw text.
fn excerpt(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    message.chars().take(200).collect()
}

//! Device addressing.

use std::fmt;

use reqwest::Url;

use crate::error::{Result, ScanError};

/// One BIG-IP management endpoint.
///
/// `host` is what the operator typed and what appears in results; the base
/// URL is `https://{host}` unless an explicit `scheme://host:port` was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    host: String,
    base_url: String,
}

impl Device {
    /// Parse a management address: `10.1.1.245`, `bigip1.lab:8443`, or a full
    /// `https://…` base URL.
    ///
    /// # Errors
    ///
    /// [`ScanError::Config`] for an empty address or an unparseable URL.
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ScanError::Config("empty device address".to_string()));
        }

        if !address.contains("://") {
            return Ok(Self {
                host: address.to_string(),
                base_url: format!("https://{address}"),
            });
        }

        let url = Url::parse(address)
            .map_err(|e| ScanError::Config(format!("invalid device URL '{address}': {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| ScanError::Config(format!("device URL has no host: {address}")))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Self {
            host,
            base_url: address.trim_end_matches('/').to_string(),
        })
    }

    /// Management address as given.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Scheme, host and port, no trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_address_defaults_to_https() {
        let d = Device::parse(" 10.1.1.245 ").unwrap();
        assert_eq!(d.host(), "10.1.1.245");
        assert_eq!(d.base_url(), "https://10.1.1.245");
    }

    #[test]
    fn explicit_url_keeps_scheme_and_port() {
        let d = Device::parse("http://127.0.0.1:8080/").unwrap();
        assert_eq!(d.host(), "127.0.0.1:8080");
        assert_eq!(d.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn empty_address_is_rejected() {
        assert!(matches!(Device::parse("  "), Err(ScanError::Config(_))));
    }
}

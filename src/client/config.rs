//! Handler configuration.
//!
//! Settings are deserialized once (usually from JSON) and handed to the
//! handler at construction. Nothing mutates them afterwards: the header policy
//! and decoder copy what they need, so a configuration change means building
//! a new handler.
//!
//! # Examples
//!
//! ```
//! use dirty_http_handler::client::Settings;
//!
//! let settings = Settings::from_json(r#"{
//!     "username": "user",
//!     "password": "secret",
//!     "defaultHeaders": { "Accept-Encoding": ["gzip", "deflate"] }
//! }"#).unwrap();
//!
//! assert_eq!(settings.username.as_deref(), Some("user"));
//! assert!(settings.keep_alive);
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Limits guarding the decoder against unbounded input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecoderLimits {
    /// Longest status, header or chunk-size line (default: 8 KiB)
    pub max_line_size: usize,
    /// Most header lines per response (default: 100)
    pub max_headers: usize,
    /// Largest body, before and after decompression (default: 10 MiB)
    pub max_body_size: usize,
}

impl Default for DecoderLimits {
    fn default() -> Self {
        Self {
            max_line_size: 8 * 1024,
            max_headers: 100,
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

impl DecoderLimits {
    /// Limits that never trigger
    pub fn unlimited() -> Self {
        Self {
            max_line_size: usize::MAX,
            max_headers: usize::MAX,
            max_body_size: usize::MAX,
        }
    }
}

/// Handler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Basic-auth user name; without it no `Authorization` header is injected
    pub username: Option<String>,
    /// Basic-auth password (empty when absent)
    pub password: Option<String>,
    /// Headers merged into every request; several values share one line
    pub default_headers: BTreeMap<String, Vec<String>>,
    /// Host to advertise in the `Host` header
    pub host: Option<String>,
    /// Port to advertise alongside `host`
    pub port: Option<u16>,
    /// Inject `Connection: keep-alive` (default: true)
    pub keep_alive: bool,
    /// Decompress gzip/deflate bodies (default: true)
    pub decompress: bool,
    /// Requests allowed to await responses at once (default: 100)
    pub request_queue_size: usize,
    /// Decoder limits
    pub limits: DecoderLimits,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            default_headers: BTreeMap::new(),
            host: None,
            port: None,
            keep_alive: true,
            decompress: true,
            request_queue_size: 100,
            limits: DecoderLimits::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set Basic-auth credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Add a default header value
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Set the advertised host and port
    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    /// Toggle `Connection: keep-alive` injection
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Toggle body decompression
    pub fn with_decompress(mut self, decompress: bool) -> Self {
        self.decompress = decompress;
        self
    }

    /// Set the pending-request queue capacity
    pub fn with_request_queue_size(mut self, size: usize) -> Self {
        self.request_queue_size = size;
        self
    }

    /// Set decoder limits
    pub fn with_limits(mut self, limits: DecoderLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Credentials, if a user name is configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username
            .as_deref()
            .map(|user| (user, self.password.as_deref().unwrap_or("")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.keep_alive);
        assert!(settings.decompress);
        assert_eq!(settings.request_queue_size, 100);
        assert!(settings.credentials().is_none());
        assert_eq!(settings.limits.max_headers, 100);
    }

    #[test]
    fn test_from_json_partial() {
        let settings = Settings::from_json(
            r#"{"defaultHeaders": {"Accept-Encoding": ["gzip", "deflate"]}, "keepAlive": false,
                "limits": {"maxHeaders": 10}}"#,
        )
        .unwrap();
        assert_eq!(
            settings.default_headers["Accept-Encoding"],
            vec!["gzip".to_string(), "deflate".to_string()]
        );
        assert!(!settings.keep_alive);
        assert_eq!(settings.limits.max_headers, 10);
        assert_eq!(settings.limits.max_line_size, 8 * 1024);
    }

    #[test]
    fn test_from_json_invalid() {
        assert!(Settings::from_json("{ not json").is_err());
    }

    #[test]
    fn test_credentials_without_password() {
        let settings = Settings {
            username: Some("user".into()),
            ..Default::default()
        };
        assert_eq!(settings.credentials(), Some(("user", "")));
    }

    #[test]
    fn test_builders() {
        let settings = Settings::default()
            .with_credentials("u", "p")
            .with_default_header("Accept", "text/plain")
            .with_default_header("Accept", "application/json")
            .with_host("localhost", 8080)
            .with_request_queue_size(2);
        assert_eq!(settings.default_headers["Accept"].len(), 2);
        assert_eq!(settings.port, Some(8080));
        assert_eq!(settings.request_queue_size, 2);
    }
}

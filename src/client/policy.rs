//! Header injection policy.
//!
//! Computes the header block for every outgoing request from an immutable
//! snapshot of [`Settings`].
//!
//! # Merge Order
//!
//! 1. **Defaults**: `Host` (from settings), configured default headers in name
//!    order, then `Connection: keep-alive` when enabled
//! 2. **Overrides**: per-request headers; a name present here removes every
//!    same-named default
//! 3. **Authorization**: `Basic` credentials, appended last when configured and
//!    not overridden by the request
//!
//! # Examples
//!
//! ```
//! use dirty_http_handler::client::{HeaderPolicy, Settings};
//! use dirty_http_handler::Headers;
//!
//! let settings = Settings::default()
//!     .with_credentials("user", "pass")
//!     .with_default_header("Accept-Encoding", "gzip")
//!     .with_default_header("Accept-Encoding", "deflate");
//! let policy = HeaderPolicy::new(&settings);
//!
//! let headers = policy.compute_headers(&Headers::new());
//! let lines: Vec<(&str, &str)> = headers.iter().collect();
//! assert_eq!(lines, vec![
//!     ("Accept-Encoding", "gzip, deflate"),
//!     ("Connection", "keep-alive"),
//!     ("Authorization", "Basic dXNlcjpwYXNz"),
//! ]);
//! ```

use crate::client::channel::Channel;
use crate::client::config::Settings;
use crate::client::encoder::append_content_length;
use crate::client::session::SessionManager;
use crate::error::Result;
use crate::protocol::constants::{headers, KEEP_ALIVE};
use crate::protocol::{basic_auth_value, format_header_values, format_host};
use crate::types::{Headers, PendingRequest};
use url::Url;

/// Immutable header policy built from settings.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    defaults: Headers,
    authorization: Option<String>,
}

impl HeaderPolicy {
    /// Snapshot the header-related parts of `settings`
    pub fn new(settings: &Settings) -> Self {
        let mut defaults = Headers::new();

        if let Some(host) = settings.host.as_deref().filter(|h| !h.is_empty()) {
            defaults.append(headers::HOST, format_host(host, settings.port));
        }

        let authorization = settings
            .credentials()
            .map(|(user, password)| basic_auth_value(user, password));

        for (name, values) in &settings.default_headers {
            if values.is_empty() {
                continue;
            }
            if authorization.is_some() && name.eq_ignore_ascii_case(headers::AUTHORIZATION) {
                continue;
            }
            if defaults.contains(name) {
                defaults.set(name.clone(), format_header_values(values));
            } else {
                defaults.append(name.clone(), format_header_values(values));
            }
        }

        if settings.keep_alive && !defaults.contains(headers::CONNECTION) {
            defaults.append(headers::CONNECTION, KEEP_ALIVE);
        }

        HeaderPolicy {
            defaults,
            authorization,
        }
    }

    /// Merge defaults, `overrides` and the authorization header.
    pub fn compute_headers(&self, overrides: &Headers) -> Headers {
        let mut merged: Headers = self
            .defaults
            .iter()
            .filter(|(name, _)| !overrides.contains(name))
            .collect();

        for (name, value) in overrides.iter() {
            merged.append(name, value);
        }

        if let Some(auth) = &self.authorization {
            if !overrides.contains(headers::AUTHORIZATION) {
                merged.append(headers::AUTHORIZATION, auth.clone());
            }
        }

        merged
    }

    /// Headers for `request`, deriving `Host` from an absolute-form target
    /// when neither settings nor the request supply one.
    pub fn headers_for(&self, request: &PendingRequest) -> Headers {
        self.headers_for_target(&request.target, &request.headers)
    }

    /// Same as [`HeaderPolicy::headers_for`] with the target and overrides
    /// given separately.
    pub fn headers_for_target(&self, target: &str, overrides: &Headers) -> Headers {
        let mut merged = self.compute_headers(overrides);

        if !merged.contains(headers::HOST) {
            if let Some(host) = host_from_target(target) {
                let mut with_host = Headers::new();
                with_host.append(headers::HOST, host);
                for (name, value) in merged.iter() {
                    with_host.append(name, value);
                }
                merged = with_host;
            }
        }

        merged
    }

    /// Replace the headers of `request` with the merged block.
    ///
    /// A computed `Content-Length` joins the overrides, so it lands before
    /// the injected `Authorization`.
    pub fn prepare(&self, mut request: PendingRequest) -> PendingRequest {
        append_content_length(&mut request.headers, request.body.as_ref());
        request.headers = self.headers_for_target(&request.target, &request.headers);
        request
    }

    /// Configured defaults, in injection order
    pub fn defaults(&self) -> &Headers {
        &self.defaults
    }

    /// Whether an `Authorization` header will be injected
    pub fn has_credentials(&self) -> bool {
        self.authorization.is_some()
    }
}

impl SessionManager for HeaderPolicy {
    fn on_request(&self, _channel: &dyn Channel, request: PendingRequest) -> Result<PendingRequest> {
        Ok(self.prepare(request))
    }
}

/// `Host` value for an absolute-form target, e.g. `http://example.com:8080/x`.
fn host_from_target(target: &str) -> Option<String> {
    if target.starts_with('/') || target == "*" {
        return None;
    }
    let url = Url::parse(target).ok()?;
    let host = url.host_str()?;
    Some(format_host(host, url.port()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(headers: &Headers) -> Vec<String> {
        headers.iter().map(|(n, _)| n.to_string()).collect()
    }

    #[test]
    fn test_no_credentials_no_auth_header() {
        let policy = HeaderPolicy::new(&Settings::default().with_keep_alive(false));
        assert!(!policy.has_credentials());
        assert!(policy.compute_headers(&Headers::new()).is_empty());
    }

    #[test]
    fn test_override_replaces_default() {
        let settings = Settings::default()
            .with_default_header("Accept", "text/plain")
            .with_default_header("User-Agent", "dirty");
        let policy = HeaderPolicy::new(&settings);

        let overrides: Headers = vec![("accept", "application/json")].into_iter().collect();
        let merged = policy.compute_headers(&overrides);

        assert_eq!(names(&merged), vec!["User-Agent", "Connection", "accept"]);
        assert_eq!(merged.get("Accept"), Some("application/json"));
        assert_eq!(merged.get_all("accept").count(), 1);
    }

    #[test]
    fn test_override_authorization_wins() {
        let policy = HeaderPolicy::new(&Settings::default().with_credentials("u", "p"));
        let overrides: Headers = vec![("Authorization", "Bearer token")].into_iter().collect();
        let merged = policy.compute_headers(&overrides);
        let auth: Vec<&str> = merged.get_all("Authorization").collect();
        assert_eq!(auth, vec!["Bearer token"]);
    }

    #[test]
    fn test_credentials_replace_default_authorization() {
        let settings = Settings::default()
            .with_credentials("user", "pass")
            .with_default_header("Authorization", "Bearer stale");
        let merged = HeaderPolicy::new(&settings).compute_headers(&Headers::new());
        let auth: Vec<&str> = merged.get_all("authorization").collect();
        assert_eq!(auth, vec!["Basic dXNlcjpwYXNz"]);
        assert_eq!(names(&merged).last().map(String::as_str), Some("Authorization"));
    }

    #[test]
    fn test_keep_alive_respects_configured_connection() {
        let settings = Settings::default().with_default_header("Connection", "close");
        let merged = HeaderPolicy::new(&settings).compute_headers(&Headers::new());
        assert_eq!(merged.get("connection"), Some("close"));
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_host_from_settings() {
        let policy = HeaderPolicy::new(&Settings::default().with_host("localhost", 8080));
        assert_eq!(policy.defaults().get("Host"), Some("localhost:8080"));
    }

    #[test]
    fn test_host_from_absolute_target() {
        let policy = HeaderPolicy::new(&Settings::default().with_keep_alive(false));
        let request = PendingRequest::get("http://example.com:8081/path?q=1");
        let merged = policy.headers_for(&request);
        assert_eq!(merged.get("host"), Some("example.com:8081"));

        let origin_form = policy.headers_for(&PendingRequest::get("/path"));
        assert!(!origin_form.contains("host"));
    }

    #[test]
    fn test_request_host_not_replaced() {
        let policy = HeaderPolicy::new(&Settings::default().with_host("configured", 80));
        let request = PendingRequest::get("http://other/").with_header("Host", "explicit");
        let merged = policy.headers_for(&request);
        let hosts: Vec<&str> = merged.get_all("host").collect();
        assert_eq!(hosts, vec!["explicit"]);
    }

    #[test]
    fn test_prepare_adds_length_before_auth() {
        let policy = HeaderPolicy::new(&Settings::default().with_credentials("u", "p").with_keep_alive(false));
        let request = policy.prepare(PendingRequest::new("POST", "/").with_body("xy"));
        assert_eq!(names(&request.headers), vec!["Content-Length", "Authorization"]);
        assert_eq!(request.headers.get("content-length"), Some("2"));
    }

    #[test]
    fn test_settings_not_mutated() {
        let settings = Settings::default().with_credentials("u", "p");
        let before = settings.clone();
        let _ = HeaderPolicy::new(&settings).compute_headers(&Headers::new());
        assert_eq!(settings, before);
    }
}

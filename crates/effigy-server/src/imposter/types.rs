//! Type definitions for imposters, stubs, predicates, and request capture.

use crate::error::{Error, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum response delay an operator may configure, in milliseconds.
pub const MAX_DELAY_MS: u64 = 60_000;

/// Response body bytes kept in a request-log entry.
pub const LOG_BODY_LIMIT: usize = 10 * 1024;

// ============================================================================
// Imposter
// ============================================================================

/// Lifecycle state of an imposter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImposterStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Identity and lifecycle fields of an imposter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImposterConfig {
    /// Short opaque identifier (8 hex characters).
    pub id: String,
    pub name: String,
    pub port: u16,
    pub status: ImposterStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
}

/// An imposter record as stored in the repository. Stub order is insertion
/// order, which is also the match-evaluation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImposterRecord {
    pub config: ImposterConfig,
    pub stubs: Vec<Stub>,
}

/// Generate a short opaque id: 8 hex characters.
pub fn new_imposter_id() -> String {
    format!("{:08x}", rand::thread_rng().gen::<u32>())
}

/// Generate a stub id.
pub fn new_stub_id() -> String {
    format!("stub-{:08x}", rand::thread_rng().gen::<u32>())
}

// ============================================================================
// Stubs
// ============================================================================

/// How a stub cycles through its responses on repeated matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    #[default]
    Sequential,
    Random,
    Repeat,
}

/// A match rule pairing predicates with a non-empty list of responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stub {
    pub id: String,
    #[serde(default)]
    pub predicates: Vec<Predicate>,
    pub responses: Vec<ResponseConfig>,
    #[serde(default)]
    pub response_mode: ResponseMode,
}

/// Stub as submitted by an operator; the id is assigned by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StubSpec {
    #[serde(default)]
    pub predicates: Vec<Predicate>,
    pub responses: Vec<ResponseConfig>,
    #[serde(default)]
    pub response_mode: ResponseMode,
}

impl StubSpec {
    /// Validate and promote to a stored stub with a fresh id.
    pub fn into_stub(self) -> Result<Stub> {
        if self.responses.is_empty() {
            return Err(Error::ParseError(
                "stub must have at least one response".to_string(),
            ));
        }
        for response in &self.responses {
            response.validate()?;
        }
        Ok(Stub {
            id: new_stub_id(),
            predicates: self.predicates,
            responses: self.responses,
            response_mode: self.response_mode,
        })
    }
}

// ============================================================================
// Predicates
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredicateField {
    Method,
    Path,
    Headers,
    Query,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PredicateOperator {
    Equals,
    Contains,
    StartsWith,
    Matches,
    Exists,
}

/// One `(field, operator, value)` test against a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Predicate {
    pub field: PredicateField,
    pub operator: PredicateOperator,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

pub(crate) fn default_true() -> bool {
    true
}

// ============================================================================
// Responses
// ============================================================================

fn default_status() -> u16 {
    200
}

/// A canned response within a stub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseConfig {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// Delay before the response is returned, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

impl ResponseConfig {
    pub fn validate(&self) -> Result<()> {
        if !(100..=599).contains(&self.status) {
            return Err(Error::ParseError(format!(
                "response status {} out of range 100-599",
                self.status
            )));
        }
        if let Some(delay) = self.delay {
            if delay > MAX_DELAY_MS {
                return Err(Error::ParseError(format!(
                    "delay {delay}ms exceeds maximum {MAX_DELAY_MS}ms"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Proxy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    #[default]
    Passthrough,
    Record,
}

fn default_proxy_timeout() -> u64 {
    10_000
}

/// Upstream forwarding configuration for unmatched requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub target_url: String,
    #[serde(default)]
    pub mode: ProxyMode,
    #[serde(default)]
    pub add_headers: HashMap<String, String>,
    #[serde(default)]
    pub remove_headers: Vec<String>,
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
    /// Hard upstream deadline in milliseconds.
    #[serde(default = "default_proxy_timeout")]
    pub timeout: u64,
}

impl ProxyConfig {
    pub fn validate(&self) -> Result<()> {
        let lower = self.target_url.to_ascii_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return Err(Error::ParseError(format!(
                "proxy targetUrl must start with http:// or https://, got {}",
                self.target_url
            )));
        }
        if !(100..=60_000).contains(&self.timeout) {
            return Err(Error::ParseError(format!(
                "proxy timeout {}ms out of range 100-60000",
                self.timeout
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Request capture
// ============================================================================

/// Normalised view of an incoming request, shared by the matcher, the
/// template engine, and the forwarder.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Upper-cased HTTP method.
    pub method: String,
    /// Path without the query string.
    pub path: String,
    /// Raw query string including the leading `?`, or empty.
    pub search: String,
    /// Header map with lower-cased keys.
    pub headers: HashMap<String, String>,
    /// Decoded query parameters.
    pub query: HashMap<String, String>,
    /// Body decoded as JSON when the content type says so, else as a JSON
    /// string; `None` for an empty body.
    pub body: Option<serde_json::Value>,
    /// Raw body bytes, forwarded verbatim by the proxy.
    pub body_bytes: Bytes,
}

/// One entry in the per-imposter request log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogEntry {
    pub id: String,
    pub imposter_id: String,
    pub timestamp: DateTime<Utc>,
    pub request: LoggedRequest,
    pub response: LoggedResponse,
    /// Wall-clock handling time in milliseconds.
    pub duration: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// Body text, truncated to [`LOG_BODY_LIMIT`] bytes.
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_stub_id: Option<String>,
    pub proxied: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imposter_id_shape() {
        let id = new_imposter_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_response_status_bounds() {
        let ok_low = ResponseConfig {
            status: 100,
            headers: None,
            body: None,
            delay: None,
        };
        assert!(ok_low.validate().is_ok());

        let ok_high = ResponseConfig { status: 599, ..ok_low.clone() };
        assert!(ok_high.validate().is_ok());

        let bad = ResponseConfig { status: 600, ..ok_low.clone() };
        assert!(bad.validate().is_err());

        let bad_low = ResponseConfig { status: 99, ..ok_low };
        assert!(bad_low.validate().is_err());
    }

    #[test]
    fn test_delay_bounds() {
        let base = ResponseConfig {
            status: 200,
            headers: None,
            body: None,
            delay: Some(0),
        };
        assert!(base.validate().is_ok());

        let max = ResponseConfig { delay: Some(60_000), ..base.clone() };
        assert!(max.validate().is_ok());

        let over = ResponseConfig { delay: Some(60_001), ..base };
        assert!(over.validate().is_err());
    }

    #[test]
    fn test_proxy_validation() {
        let mut proxy = ProxyConfig {
            target_url: "http://upstream:8080".to_string(),
            mode: ProxyMode::Passthrough,
            add_headers: HashMap::new(),
            remove_headers: Vec::new(),
            follow_redirects: true,
            timeout: 10_000,
        };
        assert!(proxy.validate().is_ok());

        proxy.target_url = "ftp://upstream".to_string();
        assert!(proxy.validate().is_err());

        proxy.target_url = "https://upstream".to_string();
        proxy.timeout = 99;
        assert!(proxy.validate().is_err());
        proxy.timeout = 60_001;
        assert!(proxy.validate().is_err());
    }

    #[test]
    fn test_stub_spec_requires_responses() {
        let spec = StubSpec {
            predicates: Vec::new(),
            responses: Vec::new(),
            response_mode: ResponseMode::Sequential,
        };
        assert!(spec.into_stub().is_err());
    }

    #[test]
    fn test_stub_spec_deserialization_defaults() {
        let spec: StubSpec = serde_json::from_str(
            r#"{"responses": [{"body": {"greeting": "hi"}}]}"#,
        )
        .unwrap();
        assert!(spec.predicates.is_empty());
        assert_eq!(spec.response_mode, ResponseMode::Sequential);
        assert_eq!(spec.responses[0].status, 200);

        let stub = spec.into_stub().unwrap();
        assert!(stub.id.starts_with("stub-"));
    }

    #[test]
    fn test_predicate_deserialization() {
        let p: Predicate = serde_json::from_str(
            r#"{"field": "path", "operator": "startsWith", "value": "/api", "caseSensitive": false}"#,
        )
        .unwrap();
        assert_eq!(p.field, PredicateField::Path);
        assert_eq!(p.operator, PredicateOperator::StartsWith);
        assert!(!p.case_sensitive);

        // caseSensitive defaults to true
        let p: Predicate = serde_json::from_str(
            r#"{"field": "method", "operator": "equals", "value": "GET"}"#,
        )
        .unwrap();
        assert!(p.case_sensitive);
    }

    #[test]
    fn test_proxy_mode_serde() {
        let cfg: ProxyConfig = serde_json::from_str(
            r#"{"targetUrl": "http://up:8080", "mode": "record"}"#,
        )
        .unwrap();
        assert_eq!(cfg.mode, ProxyMode::Record);
        assert!(cfg.follow_redirects);
        assert_eq!(cfg.timeout, 10_000);
        assert!(cfg.remove_headers.is_empty());
    }
}

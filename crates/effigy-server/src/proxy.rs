//! Upstream forwarding for unmatched requests, with hop-by-hop header
//! filtering and record-mode stub generation.

use crate::error::ProxyError;
use crate::imposter::types::{
    new_stub_id, Predicate, PredicateField, PredicateOperator, ProxyConfig, RequestContext,
    ResponseConfig, ResponseMode, Stub,
};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Headers that apply only between two directly connected peers and must
/// not be forwarded.
pub const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "host",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Response captured from the upstream, ready for relay or recording.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_json(&self) -> bool {
        self.headers.iter().any(|(k, v)| {
            k.eq_ignore_ascii_case("content-type") && v.to_ascii_lowercase().contains("application/json")
        })
    }
}

pub struct ProxyForwarder {
    following: reqwest::Client,
    direct: reqwest::Client,
}

impl Default for ProxyForwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyForwarder {
    pub fn new() -> Self {
        Self {
            following: reqwest::Client::builder()
                .redirect(Policy::limited(10))
                .build()
                .expect("failed to build HTTP client"),
            direct: reqwest::Client::builder()
                .redirect(Policy::none())
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    /// Forward the request to the configured upstream. The configured
    /// timeout is a hard deadline covering the whole exchange.
    pub async fn forward(
        &self,
        ctx: &RequestContext,
        config: &ProxyConfig,
    ) -> Result<UpstreamResponse, ProxyError> {
        let url = build_target_url(config, ctx);
        debug!("Forwarding {} {} to {}", ctx.method, ctx.path, url);

        let method = reqwest::Method::from_bytes(ctx.method.as_bytes())
            .map_err(|_| ProxyError::Unreachable(format!("invalid method {}", ctx.method)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in outbound_headers(ctx, config) {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                headers.insert(name, value);
            }
        }

        let client = if config.follow_redirects {
            &self.following
        } else {
            &self.direct
        };

        let mut request = client
            .request(method, url)
            .headers(headers)
            .timeout(Duration::from_millis(config.timeout));

        if ctx.method != "GET" && ctx.method != "HEAD" {
            request = request.body(ctx.body_bytes.clone());
        }

        let response = request.send().await.map_err(|e| classify(e, config))?;

        let status = response.status().as_u16();
        let response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|value| (k.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|e| classify(e, config))?;

        Ok(UpstreamResponse {
            status,
            headers: response_headers,
            body,
        })
    }
}

fn classify(error: reqwest::Error, config: &ProxyConfig) -> ProxyError {
    if error.is_timeout() {
        ProxyError::TimedOut(config.timeout)
    } else {
        ProxyError::Unreachable(error.to_string())
    }
}

/// Target URL: trimmed base + original path + original query string.
pub(crate) fn build_target_url(config: &ProxyConfig, ctx: &RequestContext) -> String {
    format!(
        "{}{}{}",
        config.target_url.trim_end_matches('/'),
        ctx.path,
        ctx.search
    )
}

/// Request headers as sent upstream: captured headers minus the hop-by-hop
/// set, minus `removeHeaders`, with `addHeaders` applied last (overriding).
pub(crate) fn outbound_headers(ctx: &RequestContext, config: &ProxyConfig) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = ctx
        .headers
        .iter()
        .filter(|(k, _)| !is_hop_by_hop(k))
        .filter(|(k, _)| {
            !config
                .remove_headers
                .iter()
                .any(|r| r.eq_ignore_ascii_case(k))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    for (name, value) in &config.add_headers {
        out.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        out.push((name.clone(), value.clone()));
    }
    out
}

/// Turn an upstream exchange into a replayable stub: predicates pin the
/// method and path (case-sensitive), the single response carries the
/// upstream status, headers, and body in `sequential` mode.
pub fn record_as_stub(ctx: &RequestContext, response: &UpstreamResponse) -> Stub {
    let predicates = vec![
        Predicate {
            field: PredicateField::Method,
            operator: PredicateOperator::Equals,
            value: serde_json::Value::String(ctx.method.clone()),
            case_sensitive: true,
        },
        Predicate {
            field: PredicateField::Path,
            operator: PredicateOperator::Equals,
            value: serde_json::Value::String(ctx.path.clone()),
            case_sensitive: true,
        },
    ];

    let headers: HashMap<String, String> = response
        .headers
        .iter()
        .filter(|(k, _)| !is_hop_by_hop(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let body = if response.body.is_empty() {
        None
    } else if response.is_json() {
        match serde_json::from_slice(&response.body) {
            Ok(value) => Some(value),
            Err(_) => Some(serde_json::Value::String(
                String::from_utf8_lossy(&response.body).to_string(),
            )),
        }
    } else {
        Some(serde_json::Value::String(
            String::from_utf8_lossy(&response.body).to_string(),
        ))
    };

    Stub {
        id: new_stub_id(),
        predicates,
        responses: vec![ResponseConfig {
            status: response.status,
            headers: if headers.is_empty() { None } else { Some(headers) },
            body,
            delay: None,
        }],
        response_mode: ResponseMode::Sequential,
    }
}

//! System handlers: health, info, Prometheus metrics.

use crate::admin::types::json_response;
use crate::control::ImposterService;
use crate::metrics;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// GET /health
pub fn handle_health(service: &ImposterService) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &service.health())
}

/// GET /info
pub fn handle_info(service: &ImposterService) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &service.info())
}

/// GET /metrics - Prometheus text format
pub fn handle_metrics() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(Full::new(Bytes::from(metrics::collect_metrics())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_metrics() {
        let resp = handle_metrics();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp
            .headers()
            .get("Content-Type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }
}

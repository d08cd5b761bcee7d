//! Response helpers for the admin API.

use crate::error::Error;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;

/// Error envelope: every non-2xx admin response carries a `message`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

/// Create a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{}"))))
}

/// Create an error response with a JSON `message` body
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(
        status,
        &ErrorBody {
            message: message.to_string(),
        },
    )
}

/// Map a core error onto its admin HTTP representation.
pub fn error_from(err: &Error) -> Response<Full<Bytes>> {
    error_response(err.status(), &err.to_string())
}

pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

/// Collect request body into bytes
pub async fn collect_body(req: Request<Incoming>) -> Result<Bytes, Error> {
    req.collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| Error::ParseError(format!("failed to read request body: {e}")))
}

/// Deserialise a JSON request body, mapping failures to `ParseError` (400).
pub fn parse_json<T: serde::de::DeserializeOwned>(bytes: &Bytes) -> Result<T, Error> {
    serde_json::from_slice(bytes).map_err(|e| Error::ParseError(format!("invalid JSON body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_response_sets_content_type() {
        let resp = json_response(StatusCode::OK, &serde_json::json!({"a": 1}));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("Content-Type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_error_from_maps_status() {
        let resp = error_from(&Error::ImposterNotFound("x".into()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = error_from(&Error::PortConflict(6000));
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = error_from(&Error::ParseError("bad".into()));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_parse_json() {
        let bytes = Bytes::from_static(br#"{"name": "svc"}"#);
        let value: serde_json::Value = parse_json(&bytes).unwrap();
        assert_eq!(value["name"], "svc");

        let bad = Bytes::from_static(b"not json");
        assert!(parse_json::<serde_json::Value>(&bad).is_err());
    }
}

//! Stub CRUD handlers.

use crate::admin::types::{collect_body, error_from, json_response, parse_json};
use crate::control::ImposterService;
use crate::imposter::types::StubSpec;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};

/// GET /imposters/{id}/stubs
pub fn handle_list(service: &ImposterService, id: &str) -> Response<Full<Bytes>> {
    match service.get_stubs(id) {
        Ok(stubs) => {
            let count = stubs.len();
            json_response(
                StatusCode::OK,
                &serde_json::json!({"stubs": stubs, "count": count}),
            )
        }
        Err(e) => error_from(&e),
    }
}

/// POST /imposters/{id}/stubs
pub async fn handle_add(
    req: Request<Incoming>,
    service: &ImposterService,
    id: &str,
) -> Response<Full<Bytes>> {
    let body = match collect_body(req).await {
        Ok(body) => body,
        Err(e) => return error_from(&e),
    };
    let spec: StubSpec = match parse_json(&body) {
        Ok(spec) => spec,
        Err(e) => return error_from(&e),
    };
    match service.add_stub(id, spec) {
        Ok(stub) => json_response(StatusCode::CREATED, &stub),
        Err(e) => error_from(&e),
    }
}

/// PUT /imposters/{id}/stubs/{stubId}
pub async fn handle_update(
    req: Request<Incoming>,
    service: &ImposterService,
    id: &str,
    stub_id: &str,
) -> Response<Full<Bytes>> {
    let body = match collect_body(req).await {
        Ok(body) => body,
        Err(e) => return error_from(&e),
    };
    let spec: StubSpec = match parse_json(&body) {
        Ok(spec) => spec,
        Err(e) => return error_from(&e),
    };
    match service.update_stub(id, stub_id, spec) {
        Ok(stub) => json_response(StatusCode::OK, &stub),
        Err(e) => error_from(&e),
    }
}

/// DELETE /imposters/{id}/stubs/{stubId}
pub fn handle_delete(
    service: &ImposterService,
    id: &str,
    stub_id: &str,
) -> Response<Full<Bytes>> {
    match service.remove_stub(id, stub_id) {
        Ok(stub) => json_response(StatusCode::OK, &stub),
        Err(e) => error_from(&e),
    }
}

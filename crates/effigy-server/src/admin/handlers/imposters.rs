//! Imposter lifecycle handlers, plus request-log and stats endpoints.

use crate::admin::types::{collect_body, error_from, json_response, parse_json};
use crate::control::{CreateImposter, ImposterService, ListParams, UpdateImposter};
use crate::error::Error;
use crate::imposter::types::ImposterStatus;
use crate::request_log::LogFilter;
use crate::runtime::parse_query_string;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};

/// GET /imposters
pub fn handle_list(service: &ImposterService, query: Option<&str>) -> Response<Full<Bytes>> {
    let params = match parse_list_params(query) {
        Ok(params) => params,
        Err(e) => return error_from(&e),
    };
    let (imposters, total) = service.list_imposters(&params);
    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "imposters": imposters,
            "total": total,
            "limit": params.limit,
            "offset": params.offset,
        }),
    )
}

/// POST /imposters
pub async fn handle_create(
    req: Request<Incoming>,
    service: &ImposterService,
) -> Response<Full<Bytes>> {
    let body = match collect_body(req).await {
        Ok(body) => body,
        Err(e) => return error_from(&e),
    };
    let create: CreateImposter = match parse_json(&body) {
        Ok(create) => create,
        Err(e) => return error_from(&e),
    };
    match service.create_imposter(create) {
        Ok(view) => json_response(StatusCode::CREATED, &view),
        Err(e) => error_from(&e),
    }
}

/// GET /imposters/{id}
pub fn handle_get(service: &ImposterService, id: &str) -> Response<Full<Bytes>> {
    match service.get_imposter(id) {
        Ok(view) => json_response(StatusCode::OK, &view),
        Err(e) => error_from(&e),
    }
}

/// PATCH /imposters/{id}
pub async fn handle_update(
    req: Request<Incoming>,
    service: &ImposterService,
    id: &str,
) -> Response<Full<Bytes>> {
    let body = match collect_body(req).await {
        Ok(body) => body,
        Err(e) => return error_from(&e),
    };
    let patch: UpdateImposter = match parse_json(&body) {
        Ok(patch) => patch,
        Err(e) => return error_from(&e),
    };
    match service.update_imposter(id, patch).await {
        Ok(view) => json_response(StatusCode::OK, &view),
        Err(e) => error_from(&e),
    }
}

/// DELETE /imposters/{id}?force=
pub fn handle_delete(
    service: &ImposterService,
    id: &str,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    let force = parse_query_string(query)
        .get("force")
        .map(|v| v == "true")
        .unwrap_or(false);
    match service.delete_imposter(id, force) {
        Ok(view) => json_response(StatusCode::OK, &view),
        Err(e) => error_from(&e),
    }
}

/// GET /imposters/{id}/requests
pub fn handle_get_requests(
    service: &ImposterService,
    id: &str,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    let filter = match parse_log_filter(query) {
        Ok(filter) => filter,
        Err(e) => return error_from(&e),
    };
    match service.get_requests(id, &filter) {
        Ok(requests) => {
            let count = requests.len();
            json_response(
                StatusCode::OK,
                &serde_json::json!({
                    "requests": requests,
                    "count": count,
                }),
            )
        }
        Err(e) => error_from(&e),
    }
}

/// DELETE /imposters/{id}/requests
pub fn handle_clear_requests(service: &ImposterService, id: &str) -> Response<Full<Bytes>> {
    match service.clear_requests(id) {
        Ok(()) => json_response(
            StatusCode::OK,
            &serde_json::json!({"message": "Request log cleared"}),
        ),
        Err(e) => error_from(&e),
    }
}

/// GET /imposters/{id}/stats
pub fn handle_get_stats(service: &ImposterService, id: &str) -> Response<Full<Bytes>> {
    match service.get_stats(id) {
        Ok(stats) => json_response(StatusCode::OK, &stats),
        Err(e) => error_from(&e),
    }
}

/// DELETE /imposters/{id}/stats
pub fn handle_reset_stats(service: &ImposterService, id: &str) -> Response<Full<Bytes>> {
    match service.reset_stats(id) {
        Ok(()) => json_response(
            StatusCode::OK,
            &serde_json::json!({"message": "Stats reset"}),
        ),
        Err(e) => error_from(&e),
    }
}

fn parse_list_params(query: Option<&str>) -> Result<ListParams, Error> {
    let params = parse_query_string(query);
    let mut list = ListParams::default();

    if let Some(limit) = params.get("limit") {
        list.limit = limit
            .parse::<usize>()
            .ok()
            .filter(|l| *l > 0)
            .ok_or_else(|| Error::ParseError(format!("limit must be a positive integer: {limit}")))?;
    }
    if let Some(offset) = params.get("offset") {
        list.offset = offset
            .parse::<usize>()
            .map_err(|_| Error::ParseError(format!("offset must be a non-negative integer: {offset}")))?;
    }
    if let Some(status) = params.get("status") {
        list.status = Some(parse_status(status)?);
    }
    list.protocol = params.get("protocol").cloned();
    Ok(list)
}

fn parse_log_filter(query: Option<&str>) -> Result<LogFilter, Error> {
    let params = parse_query_string(query);
    let mut filter = LogFilter::default();

    if let Some(limit) = params.get("limit") {
        filter.limit = Some(limit.parse::<usize>().ok().filter(|l| *l > 0).ok_or_else(
            || Error::ParseError(format!("limit must be a positive integer: {limit}")),
        )?);
    }
    filter.method = params.get("method").cloned();
    filter.path = params.get("path").cloned();
    if let Some(status) = params.get("status") {
        filter.status = Some(status.parse::<u16>().map_err(|_| {
            Error::ParseError(format!("status must be a status code: {status}"))
        })?);
    }
    Ok(filter)
}

fn parse_status(value: &str) -> Result<ImposterStatus, Error> {
    match value.to_ascii_lowercase().as_str() {
        "stopped" => Ok(ImposterStatus::Stopped),
        "starting" => Ok(ImposterStatus::Starting),
        "running" => Ok(ImposterStatus::Running),
        "stopping" => Ok(ImposterStatus::Stopping),
        other => Err(Error::ParseError(format!("unknown status: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_params_defaults() {
        let params = parse_list_params(None).unwrap();
        assert_eq!(params.limit, 50);
        assert_eq!(params.offset, 0);
        assert!(params.status.is_none());
        assert!(params.protocol.is_none());
    }

    #[test]
    fn test_parse_list_params_full() {
        let params =
            parse_list_params(Some("limit=10&offset=5&status=running&protocol=HTTP")).unwrap();
        assert_eq!(params.limit, 10);
        assert_eq!(params.offset, 5);
        assert_eq!(params.status, Some(ImposterStatus::Running));
        assert_eq!(params.protocol.as_deref(), Some("HTTP"));
    }

    #[test]
    fn test_parse_list_params_rejects_bad_values() {
        assert!(parse_list_params(Some("limit=0")).is_err());
        assert!(parse_list_params(Some("limit=abc")).is_err());
        assert!(parse_list_params(Some("offset=-1")).is_err());
        assert!(parse_list_params(Some("status=flying")).is_err());
    }

    #[test]
    fn test_parse_log_filter() {
        let filter = parse_log_filter(Some("limit=5&method=GET&path=/a&status=404")).unwrap();
        assert_eq!(filter.limit, Some(5));
        assert_eq!(filter.method.as_deref(), Some("GET"));
        assert_eq!(filter.path.as_deref(), Some("/a"));
        assert_eq!(filter.status, Some(404));

        assert!(parse_log_filter(Some("status=abc")).is_err());
    }
}

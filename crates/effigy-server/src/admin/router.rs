//! Route dispatch for the admin API.

use crate::admin::handlers::{imposters, stubs, system};
use crate::admin::types::not_found;
use crate::control::ImposterService;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::sync::Arc;
use tracing::debug;

/// Parsed route under `/imposters/{id}`.
enum ImposterRoute {
    /// GET/PATCH/DELETE /imposters/{id}
    Root,
    /// GET/POST /imposters/{id}/stubs
    Stubs,
    /// PUT/DELETE /imposters/{id}/stubs/{stubId}
    StubById(String),
    /// GET/DELETE /imposters/{id}/requests
    Requests,
    /// GET/DELETE /imposters/{id}/stats
    Stats,
}

impl ImposterRoute {
    fn parse(segments: &[&str]) -> Option<Self> {
        match segments {
            [] => Some(ImposterRoute::Root),
            ["stubs"] => Some(ImposterRoute::Stubs),
            ["stubs", stub_id] => Some(ImposterRoute::StubById(stub_id.to_string())),
            ["requests"] => Some(ImposterRoute::Requests),
            ["stats"] => Some(ImposterRoute::Stats),
            _ => None,
        }
    }
}

/// Main request router
pub async fn route_request(
    req: Request<Incoming>,
    service: Arc<ImposterService>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());

    debug!("Admin API: {} {}", method, path);

    let response = route_by_path(&method, &path, query.as_deref(), req, service).await;
    Ok(response)
}

async fn route_by_path(
    method: &Method,
    path: &str,
    query: Option<&str>,
    req: Request<Incoming>,
    service: Arc<ImposterService>,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/health") => return system::handle_health(&service),
        (&Method::GET, "/info") => return system::handle_info(&service),
        (&Method::GET, "/metrics") => return system::handle_metrics(),
        _ => {}
    }

    if path == "/imposters" {
        return match *method {
            Method::GET => imposters::handle_list(&service, query),
            Method::POST => imposters::handle_create(req, &service).await,
            _ => not_found(),
        };
    }

    if let Some(rest) = path.strip_prefix("/imposters/") {
        return route_imposter(method, rest, query, req, service).await;
    }

    not_found()
}

async fn route_imposter(
    method: &Method,
    path: &str,
    query: Option<&str>,
    req: Request<Incoming>,
    service: Arc<ImposterService>,
) -> Response<Full<Bytes>> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let (id, rest) = match segments.split_first() {
        Some((id, rest)) => (id.to_string(), rest),
        None => return not_found(),
    };

    let route = match ImposterRoute::parse(rest) {
        Some(route) => route,
        None => return not_found(),
    };

    match (method, route) {
        (&Method::GET, ImposterRoute::Root) => imposters::handle_get(&service, &id),
        (&Method::PATCH, ImposterRoute::Root) => {
            imposters::handle_update(req, &service, &id).await
        }
        (&Method::DELETE, ImposterRoute::Root) => imposters::handle_delete(&service, &id, query),

        (&Method::GET, ImposterRoute::Stubs) => stubs::handle_list(&service, &id),
        (&Method::POST, ImposterRoute::Stubs) => stubs::handle_add(req, &service, &id).await,
        (&Method::PUT, ImposterRoute::StubById(stub_id)) => {
            stubs::handle_update(req, &service, &id, &stub_id).await
        }
        (&Method::DELETE, ImposterRoute::StubById(stub_id)) => {
            stubs::handle_delete(&service, &id, &stub_id)
        }

        (&Method::GET, ImposterRoute::Requests) => {
            imposters::handle_get_requests(&service, &id, query)
        }
        (&Method::DELETE, ImposterRoute::Requests) => {
            imposters::handle_clear_requests(&service, &id)
        }

        (&Method::GET, ImposterRoute::Stats) => imposters::handle_get_stats(&service, &id),
        (&Method::DELETE, ImposterRoute::Stats) => imposters::handle_reset_stats(&service, &id),

        _ => not_found(),
    }
}

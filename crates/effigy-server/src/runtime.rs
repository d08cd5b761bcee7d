//! Imposter runtime: one supervised listener per imposter running the
//! request pipeline, with hot-reloadable stub and proxy snapshots.
//!
//! Each running imposter owns a cell holding an immutable stub snapshot
//! behind an atomic reference. Writers (the admin control path) publish a
//! fresh snapshot; request handlers read whatever snapshot was current when
//! the request arrived, so a reload is never observed mid-request.

use crate::error::{Error, Result};
use crate::imposter::matcher::find_matching_stub;
use crate::imposter::response::{build_response, ResponseState};
use crate::imposter::types::{
    ImposterStatus, LoggedRequest, LoggedResponse, ProxyConfig, RequestContext, RequestLogEntry,
    Stub, LOG_BODY_LIMIT,
};
use crate::metrics;
use crate::proxy::{is_hop_by_hop, record_as_stub, ProxyForwarder};
use crate::repository::ImposterRepository;
use crate::request_log::RequestLogger;
use crate::stats::StatsAggregator;
use crate::template::TemplateEngine;
use bytes::Bytes;
use chrono::Utc;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::tasks::TaskManager;

/// Response produced by an external operator UI for `/_admin` paths.
pub struct UiResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

/// Hook for the per-imposter operator UI (an external collaborator).
/// Returning `None` lets the request fall through to the pipeline.
pub trait OperatorUi: Send + Sync {
    fn handle(&self, imposter_id: &str, ctx: &RequestContext) -> Option<UiResponse>;
}

/// Live state of one running imposter.
struct ImposterCell {
    imposter_id: String,
    stubs: RwLock<Arc<Vec<Stub>>>,
    proxy: RwLock<Option<Arc<ProxyConfig>>>,
}

/// Everything a request handler needs, shared across connections.
struct HandlerState {
    cell: Arc<ImposterCell>,
    repository: Arc<ImposterRepository>,
    response_state: Arc<ResponseState>,
    logger: Arc<RequestLogger>,
    stats: Arc<StatsAggregator>,
    forwarder: Arc<ProxyForwarder>,
    templates: Arc<TemplateEngine>,
    ui: Option<Arc<dyn OperatorUi>>,
}

pub struct ImposterRuntime {
    repository: Arc<ImposterRepository>,
    tasks: Arc<TaskManager>,
    cells: RwLock<HashMap<String, Arc<ImposterCell>>>,
    response_state: Arc<ResponseState>,
    logger: Arc<RequestLogger>,
    stats: Arc<StatsAggregator>,
    forwarder: Arc<ProxyForwarder>,
    templates: Arc<TemplateEngine>,
    ui: RwLock<Option<Arc<dyn OperatorUi>>>,
}

impl ImposterRuntime {
    pub fn new(
        repository: Arc<ImposterRepository>,
        logger: Arc<RequestLogger>,
        stats: Arc<StatsAggregator>,
        forwarder: Arc<ProxyForwarder>,
        templates: Arc<TemplateEngine>,
    ) -> Self {
        Self {
            repository,
            tasks: Arc::new(TaskManager::new()),
            cells: RwLock::new(HashMap::new()),
            response_state: Arc::new(ResponseState::new()),
            logger,
            stats,
            forwarder,
            templates,
            ui: RwLock::new(None),
        }
    }

    /// Install the external operator UI serving `/_admin` paths.
    pub fn set_operator_ui(&self, ui: Arc<dyn OperatorUi>) {
        *self.ui.write() = Some(ui);
    }

    /// Bind a listener on the imposter's port and launch its supervised
    /// task. On success the repository status is `running`.
    pub async fn start(self: &Arc<Self>, id: &str) -> Result<()> {
        let record = self.repository.get(id)?;
        // At most one listener per imposter.
        if self.tasks.is_running(id) {
            self.stop(id);
        }
        self.repository
            .update(id, |r| r.config.status = ImposterStatus::Starting)?;

        let cell = Arc::new(ImposterCell {
            imposter_id: record.config.id.clone(),
            stubs: RwLock::new(Arc::new(record.stubs.clone())),
            proxy: RwLock::new(record.config.proxy.clone().map(Arc::new)),
        });
        self.cells.write().insert(id.to_string(), Arc::clone(&cell));

        let addr = SocketAddr::from(([0, 0, 0, 0], record.config.port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.cells.write().remove(id);
                let _ = self
                    .repository
                    .update(id, |r| r.config.status = ImposterStatus::Stopped);
                return Err(Error::ImposterServerError(format!(
                    "failed to bind port {}: {e}",
                    record.config.port
                )));
            }
        };
        info!(
            "Imposter {} ({}) listening on port {}",
            record.config.id, record.config.name, record.config.port
        );

        let state = Arc::new(HandlerState {
            cell,
            repository: Arc::clone(&self.repository),
            response_state: Arc::clone(&self.response_state),
            logger: Arc::clone(&self.logger),
            stats: Arc::clone(&self.stats),
            forwarder: Arc::clone(&self.forwarder),
            templates: Arc::clone(&self.templates),
            ui: self.ui.read().clone(),
        });

        let runtime = Arc::clone(self);
        let key = id.to_string();
        self.tasks.start(id, move |token| async move {
            metrics::listener_started();
            // The listener lives inside this scope; every exit path,
            // including a crash of the accept loop, releases it.
            let cancelled = run_listener(listener, state, token).await;
            metrics::listener_stopped();
            if !cancelled {
                warn!("Imposter {} listener failed; resetting to stopped", key);
                runtime.dispose_after_failure(&key);
            }
        });

        self.repository
            .update(id, |r| r.config.status = ImposterStatus::Running)?;
        Ok(())
    }

    /// Tear the listener down. Idempotent; never fails.
    pub fn stop(&self, id: &str) {
        let was_running = self.tasks.stop(id);
        self.cells.write().remove(id);
        let _ = self
            .repository
            .update(id, |r| r.config.status = ImposterStatus::Stopped);
        self.logger.remove_imposter(id);
        if was_running {
            info!("Imposter {} stopped", id);
        }
    }

    /// Replace the running cell's stub snapshot with the repository's
    /// current stubs. Visible to every request that begins afterwards;
    /// in-flight requests keep the snapshot they observed.
    pub fn update_stubs(&self, id: &str) -> Result<()> {
        let stubs = self.repository.get_stubs(id)?;
        if let Some(cell) = self.cells.read().get(id) {
            *cell.stubs.write() = Arc::new(stubs);
            debug!("Imposter {} stubs hot-reloaded", id);
        }
        Ok(())
    }

    /// Hot-reload the running cell's proxy view from the repository.
    pub fn update_proxy(&self, id: &str) -> Result<()> {
        let record = self.repository.get(id)?;
        if let Some(cell) = self.cells.read().get(id) {
            *cell.proxy.write() = record.config.proxy.map(Arc::new);
            debug!("Imposter {} proxy hot-reloaded", id);
        }
        Ok(())
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.tasks.is_running(id)
    }

    /// Drop the imposter's response cursors (used when the record itself
    /// is destroyed).
    pub fn reset_response_state(&self, id: &str) {
        self.response_state.reset(id);
    }

    pub fn running_count(&self) -> usize {
        self.tasks.running_count()
    }

    /// Stop every running imposter (process shutdown).
    pub fn stop_all(&self) {
        let ids: Vec<String> = self.cells.read().keys().cloned().collect();
        for id in ids {
            self.stop(&id);
        }
    }

    /// Supervision hook: a crashed listener resets its imposter to
    /// `stopped` and clears its response cursors.
    fn dispose_after_failure(&self, id: &str) {
        self.cells.write().remove(id);
        let _ = self
            .repository
            .update(id, |r| r.config.status = ImposterStatus::Stopped);
        self.response_state.reset(id);
    }
}

/// Accept loop. Returns true when it exited through cancellation, false on
/// listener failure.
async fn run_listener(
    listener: TcpListener,
    state: Arc<HandlerState>,
    token: CancellationToken,
) -> bool {
    loop {
        tokio::select! {
            _ = token.cancelled() => return true,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let conn_state = Arc::clone(&state);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let state = Arc::clone(&conn_state);
                            async move { handle_request(req, state).await }
                        });
                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            debug!("Imposter connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Imposter accept error: {}", e);
                    return false;
                }
            }
        }
    }
}

/// Outcome of the matching/proxy pipeline, before it becomes an HTTP
/// response and a log entry.
struct PipelineOutcome {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
    matched_stub_id: Option<String>,
    proxied: bool,
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<HandlerState>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let ctx = extract_context(req).await;

    // Reserved operator-UI prefix; external collaborator gets first refusal.
    if ctx.path.starts_with("/_admin") {
        if let Some(ui) = &state.ui {
            if let Some(resp) = ui.handle(&state.cell.imposter_id, &ctx) {
                return Ok(to_http_response(resp.status, resp.headers.into_iter(), resp.body));
            }
        }
    }

    let outcome = run_pipeline(&state, &ctx).await;
    let duration = started.elapsed().as_secs_f64() * 1000.0;
    metrics::record_request(&ctx.method, outcome.status);
    dispatch_log(&state, &ctx, &outcome, duration);

    Ok(to_http_response(
        outcome.status,
        outcome.headers.into_iter(),
        outcome.body,
    ))
}

/// Steps 3-7 of the per-request pipeline: match, cycle, delay, proxy, 404.
async fn run_pipeline(state: &Arc<HandlerState>, ctx: &RequestContext) -> PipelineOutcome {
    let imposter_id = state.cell.imposter_id.clone();
    let snapshot = state.cell.stubs.read().clone();

    if let Some(stub) = find_matching_stub(&snapshot, ctx) {
        let index = state.response_state.next_index(
            &imposter_id,
            &stub.id,
            stub.responses.len(),
            stub.response_mode,
        );
        let config = &stub.responses[index];
        let built = build_response(config, ctx, &state.templates);
        if built.delay > 0 {
            tokio::time::sleep(Duration::from_millis(built.delay)).await;
        }
        return PipelineOutcome {
            status: built.status,
            headers: built.headers.into_iter().collect(),
            body: Bytes::from(built.body),
            matched_stub_id: Some(stub.id.clone()),
            proxied: false,
        };
    }

    let proxy = state.cell.proxy.read().clone();
    if let Some(proxy) = proxy {
        return match state.forwarder.forward(ctx, &proxy).await {
            Ok(upstream) => {
                metrics::record_proxy("ok");
                if proxy.mode == crate::imposter::types::ProxyMode::Record {
                    let stub = record_as_stub(ctx, &upstream);
                    match state.repository.add_stub(&imposter_id, stub) {
                        Ok(_) => {
                            if let Ok(stubs) = state.repository.get_stubs(&imposter_id) {
                                *state.cell.stubs.write() = Arc::new(stubs);
                            }
                        }
                        Err(e) => warn!("Failed to record stub: {}", e),
                    }
                }
                let headers: Vec<(String, String)> = upstream
                    .headers
                    .iter()
                    .filter(|(k, _)| !is_hop_by_hop(k))
                    .cloned()
                    .collect();
                PipelineOutcome {
                    status: upstream.status,
                    headers,
                    body: upstream.body,
                    matched_stub_id: None,
                    proxied: true,
                }
            }
            Err(e) => {
                metrics::record_proxy(match e {
                    crate::error::ProxyError::TimedOut(_) => "timeout",
                    crate::error::ProxyError::Unreachable(_) => "unreachable",
                });
                warn!("Proxy request failed: {}", e);
                PipelineOutcome {
                    status: 502,
                    headers: json_header(),
                    body: Bytes::from_static(br#"{"error":"Proxy failed"}"#),
                    matched_stub_id: None,
                    proxied: true,
                }
            }
        };
    }

    PipelineOutcome {
        status: 404,
        headers: json_header(),
        body: Bytes::from(
            serde_json::json!({
                "error": "No matching stub found",
                "method": ctx.method,
                "path": ctx.path,
            })
            .to_string(),
        ),
        matched_stub_id: None,
        proxied: false,
    }
}

/// Normalise the incoming request: upper-case method, lower-case header
/// keys, decoded query, JSON-or-text body.
async fn extract_context(req: Request<Incoming>) -> RequestContext {
    let (parts, body) = req.into_parts();
    let method = parts.method.as_str().to_uppercase();
    let path = parts.uri.path().to_string();
    let search = parts
        .uri
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();
    let query = parse_query_string(parts.uri.query());

    let headers: HashMap<String, String> = parts
        .headers
        .iter()
        .filter_map(|(k, v)| {
            v.to_str()
                .ok()
                .map(|value| (k.as_str().to_lowercase(), value.to_string()))
        })
        .collect();

    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    };

    let body = decode_body(&headers, &body_bytes);

    RequestContext {
        method,
        path,
        search,
        headers,
        query,
        body,
        body_bytes,
    }
}

fn decode_body(headers: &HashMap<String, String>, bytes: &Bytes) -> Option<serde_json::Value> {
    if bytes.is_empty() {
        return None;
    }
    let is_json = headers
        .get("content-type")
        .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false);
    if is_json {
        if let Ok(value) = serde_json::from_slice(bytes) {
            return Some(value);
        }
    }
    Some(serde_json::Value::String(
        String::from_utf8_lossy(bytes).to_string(),
    ))
}

/// Decode `a=b&c=d` into a map, URL-unescaping values.
pub fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(q) = query {
        for pair in q.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                let decoded = urlencoding::decode(value)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|_| value.to_string());
                params.insert(key.to_string(), decoded);
            } else if !pair.is_empty() {
                params.insert(pair.to_string(), String::new());
            }
        }
    }
    params
}

fn json_header() -> Vec<(String, String)> {
    vec![("Content-Type".to_string(), "application/json".to_string())]
}

fn to_http_response(
    status: u16,
    headers: impl Iterator<Item = (String, String)>,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR));
    for (k, v) in headers {
        builder = builder.header(k, v);
    }
    builder.body(Full::new(body)).unwrap_or_else(|e| {
        let body = serde_json::json!({
            "error": "Internal server error",
            "details": e.to_string(),
        })
        .to_string();
        Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(body)))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"Internal Server Error"))))
    })
}

/// Step 8: hand the exchange to the log and stats without blocking the
/// response. Failures are swallowed.
fn dispatch_log(
    state: &Arc<HandlerState>,
    ctx: &RequestContext,
    outcome: &PipelineOutcome,
    duration: f64,
) {
    let entry = RequestLogEntry {
        id: uuid::Uuid::new_v4().to_string(),
        imposter_id: state.cell.imposter_id.clone(),
        timestamp: Utc::now(),
        request: LoggedRequest {
            method: ctx.method.clone(),
            path: ctx.path.clone(),
            headers: ctx.headers.clone(),
            query: ctx.query.clone(),
            body: ctx.body.clone(),
        },
        response: LoggedResponse {
            status: outcome.status,
            headers: outcome.headers.iter().cloned().collect(),
            body: truncate_body(&outcome.body),
            matched_stub_id: outcome.matched_stub_id.clone(),
            proxied: outcome.proxied,
        },
        duration,
    };

    let logger = Arc::clone(&state.logger);
    let stats = Arc::clone(&state.stats);
    tokio::spawn(async move {
        stats.record_request(&entry);
        logger.log(entry);
    });
}

fn truncate_body(body: &Bytes) -> String {
    let slice = if body.len() > LOG_BODY_LIMIT {
        &body[..LOG_BODY_LIMIT]
    } else {
        &body[..]
    };
    String::from_utf8_lossy(slice).to_string()
}

//! Admin orchestration: imposter CRUD, stub CRUD, request-log and stats
//! coordination across the allocator, repository, and runtime.
//!
//! The HTTP layer in `admin` only deserialises, calls into this service,
//! and maps the error sum type to status codes.

use crate::config::{Settings, StartupImposter};
use crate::error::{Error, Result};
use crate::imposter::types::{
    new_imposter_id, ImposterConfig, ImposterRecord, ImposterStatus, ProxyConfig, RequestLogEntry,
    Stub, StubSpec,
};
use crate::ports::PortAllocator;
use crate::repository::ImposterRepository;
use crate::request_log::{LogFilter, RequestLogger};
use crate::runtime::ImposterRuntime;
use crate::stats::{ImposterStats, StatsAggregator};
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Body of `POST /imposters`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateImposter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub admin_path: Option<String>,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    #[serde(default)]
    pub stubs: Vec<StubSpec>,
}

/// Body of `PATCH /imposters/{id}`. `proxy` distinguishes "absent" (no
/// change) from explicit `null` (remove the proxy).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateImposter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<ImposterStatus>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default, deserialize_with = "double_option")]
    pub proxy: Option<Option<ProxyConfig>>,
}

fn double_option<'de, D>(deserializer: D) -> std::result::Result<Option<Option<ProxyConfig>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<ProxyConfig>::deserialize(deserializer).map(Some)
}

/// Query parameters of `GET /imposters`.
#[derive(Debug, Clone)]
pub struct ListParams {
    pub limit: usize,
    pub offset: usize,
    pub status: Option<ImposterStatus>,
    pub protocol: Option<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            status: None,
            protocol: None,
        }
    }
}

/// Imposter representation returned by the admin API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImposterView {
    #[serde(flatten)]
    pub config: ImposterConfig,
    pub stubs: Vec<Stub>,
    pub url: String,
    pub admin_url: String,
}

pub struct ImposterService {
    settings: Settings,
    allocator: Arc<PortAllocator>,
    repository: Arc<ImposterRepository>,
    runtime: Arc<ImposterRuntime>,
    logger: Arc<RequestLogger>,
    stats: Arc<StatsAggregator>,
    started_at: Instant,
}

impl ImposterService {
    pub fn new(
        settings: Settings,
        allocator: Arc<PortAllocator>,
        repository: Arc<ImposterRepository>,
        runtime: Arc<ImposterRuntime>,
        logger: Arc<RequestLogger>,
        stats: Arc<StatsAggregator>,
    ) -> Self {
        Self {
            settings,
            allocator,
            repository,
            runtime,
            logger,
            stats,
            started_at: Instant::now(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn view(&self, record: &ImposterRecord) -> ImposterView {
        ImposterView {
            config: record.config.clone(),
            stubs: record.stubs.clone(),
            url: format!("http://localhost:{}", record.config.port),
            admin_url: format!(
                "http://localhost:{}/imposters/{}",
                self.settings.admin_port, record.config.id
            ),
        }
    }

    // ------------------------------------------------------------------
    // Imposter lifecycle
    // ------------------------------------------------------------------

    /// Create a new (stopped) imposter.
    pub fn create_imposter(&self, request: CreateImposter) -> Result<ImposterView> {
        if let Some(protocol) = &request.protocol {
            if !protocol.eq_ignore_ascii_case("http") {
                return Err(Error::ParseError(format!(
                    "unsupported protocol: {protocol}"
                )));
            }
        }
        if let Some(admin_path) = &request.admin_path {
            if !admin_path.starts_with('/') {
                return Err(Error::ParseError(
                    "adminPath must start with '/'".to_string(),
                ));
            }
        }
        if let Some(proxy) = &request.proxy {
            proxy.validate()?;
        }
        // Validate stubs before touching any shared state.
        let stubs: Vec<Stub> = request
            .stubs
            .into_iter()
            .map(StubSpec::into_stub)
            .collect::<Result<_>>()?;

        if self.repository.count() >= self.settings.max_imposters {
            return Err(Error::ServiceError(format!(
                "maximum number of imposters ({}) reached",
                self.settings.max_imposters
            )));
        }

        let port = self.allocator.allocate(request.port)?;
        let id = new_imposter_id();
        let name = request
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| id.clone());

        self.repository.create(ImposterConfig {
            id: id.clone(),
            name,
            port,
            status: ImposterStatus::Stopped,
            created_at: Utc::now(),
            proxy: request.proxy,
        });
        for stub in stubs {
            if let Err(e) = self.repository.add_stub(&id, stub) {
                let _ = self.repository.remove(&id);
                self.allocator.release(port);
                return Err(e);
            }
        }

        info!("Created imposter {} on port {}", id, port);
        self.repository.get(&id).map(|r| self.view(&r))
    }

    pub fn get_imposter(&self, id: &str) -> Result<ImposterView> {
        self.repository.get(id).map(|r| self.view(&r))
    }

    /// Paged listing with optional status/protocol filters. Returns the
    /// page and the total after filtering.
    pub fn list_imposters(&self, params: &ListParams) -> (Vec<ImposterView>, usize) {
        let records = self.repository.get_all();
        let filtered: Vec<&ImposterRecord> = records
            .iter()
            .filter(|r| {
                params
                    .status
                    .map(|s| r.config.status == s)
                    .unwrap_or(true)
                    && params
                        .protocol
                        .as_ref()
                        .map(|p| p.eq_ignore_ascii_case("http"))
                        .unwrap_or(true)
            })
            .collect();
        let total = filtered.len();
        let page = filtered
            .into_iter()
            .skip(params.offset)
            .take(params.limit)
            .map(|r| self.view(r))
            .collect();
        (page, total)
    }

    /// Partial update. Port changes while running follow the stop /
    /// allocate-new / release-old / persist / restart choreography, with
    /// the new port released on any later failure.
    pub async fn update_imposter(&self, id: &str, patch: UpdateImposter) -> Result<ImposterView> {
        let record = self.repository.get(id)?;
        if let Some(Some(proxy)) = &patch.proxy {
            proxy.validate()?;
        }
        if let Some(status) = patch.status {
            if !matches!(status, ImposterStatus::Running | ImposterStatus::Stopped) {
                return Err(Error::ParseError(
                    "status must be 'running' or 'stopped'".to_string(),
                ));
            }
        }

        let was_running = self.runtime.is_running(id);
        let old_port = record.config.port;
        let port_changed = patch.port.map(|p| p != old_port).unwrap_or(false);

        let mut new_port = None;
        if port_changed {
            let target = patch.port.unwrap_or(old_port);
            if was_running {
                self.runtime.stop(id);
            }
            let allocated = self.allocator.allocate(Some(target))?;
            self.allocator.release(old_port);
            new_port = Some(allocated);
        }

        self.repository.update(id, |r| {
            if let Some(name) = &patch.name {
                if !name.trim().is_empty() {
                    r.config.name = name.clone();
                }
            }
            if let Some(port) = new_port {
                r.config.port = port;
            }
            if let Some(proxy) = &patch.proxy {
                r.config.proxy = proxy.clone();
            }
        })?;

        // Any proxy edit hot-reloads the running cell's proxy view.
        if patch.proxy.is_some() {
            let _ = self.runtime.update_proxy(id);
        }

        let desired = patch.status;
        let should_start = if port_changed {
            (was_running && desired != Some(ImposterStatus::Stopped))
                || desired == Some(ImposterStatus::Running)
        } else {
            desired == Some(ImposterStatus::Running) && !was_running
        };
        let should_stop =
            !port_changed && desired == Some(ImposterStatus::Stopped) && was_running;

        if should_start {
            if let Err(e) = self.runtime.start(id).await {
                if let Some(port) = new_port {
                    self.allocator.release(port);
                }
                return Err(e);
            }
        } else if should_stop {
            self.runtime.stop(id);
        }

        self.repository.get(id).map(|r| self.view(&r))
    }

    /// Delete an imposter. Refused (409) unless it is stopped or `force`
    /// is set; releases the port and clears log and metrics.
    pub fn delete_imposter(&self, id: &str, force: bool) -> Result<ImposterView> {
        let record = self.repository.get(id)?;
        if record.config.status != ImposterStatus::Stopped && !force {
            return Err(Error::ImposterRunning(id.to_string()));
        }
        if self.runtime.is_running(id) {
            self.runtime.stop(id);
        }
        let mut removed = self.repository.remove(id)?;
        removed.config.status = ImposterStatus::Stopped;
        self.allocator.release(removed.config.port);
        self.stats.reset_stats(id);
        self.logger.remove_imposter(id);
        self.runtime.reset_response_state(id);
        info!("Deleted imposter {} (port {})", id, removed.config.port);
        Ok(self.view(&removed))
    }

    // ------------------------------------------------------------------
    // Stubs
    // ------------------------------------------------------------------

    pub fn add_stub(&self, id: &str, spec: StubSpec) -> Result<Stub> {
        let stub = spec.into_stub()?;
        let stub = self.repository.add_stub(id, stub)?;
        self.hot_reload(id);
        Ok(stub)
    }

    pub fn get_stubs(&self, id: &str) -> Result<Vec<Stub>> {
        self.repository.get_stubs(id)
    }

    /// Replace a stub's predicates, responses, and mode, keeping its id.
    pub fn update_stub(&self, id: &str, stub_id: &str, spec: StubSpec) -> Result<Stub> {
        let replacement = spec.into_stub()?;
        let stub = self.repository.update_stub(id, stub_id, move |s| {
            s.predicates = replacement.predicates;
            s.responses = replacement.responses;
            s.response_mode = replacement.response_mode;
        })?;
        self.hot_reload(id);
        Ok(stub)
    }

    pub fn remove_stub(&self, id: &str, stub_id: &str) -> Result<Stub> {
        let stub = self.repository.remove_stub(id, stub_id)?;
        self.hot_reload(id);
        Ok(stub)
    }

    fn hot_reload(&self, id: &str) {
        if self.runtime.is_running(id) {
            let _ = self.runtime.update_stubs(id);
        }
    }

    // ------------------------------------------------------------------
    // Request log and stats
    // ------------------------------------------------------------------

    pub fn get_requests(&self, id: &str, filter: &LogFilter) -> Result<Vec<RequestLogEntry>> {
        self.repository.get(id)?;
        Ok(self.logger.get_entries(id, filter))
    }

    pub fn clear_requests(&self, id: &str) -> Result<()> {
        self.repository.get(id)?;
        self.logger.clear(id);
        Ok(())
    }

    pub fn get_stats(&self, id: &str) -> Result<ImposterStats> {
        self.repository.get(id)?;
        Ok(self.stats.get_stats(id))
    }

    pub fn reset_stats(&self, id: &str) -> Result<()> {
        self.repository.get(id)?;
        self.stats.reset_stats(id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // System surfaces
    // ------------------------------------------------------------------

    pub fn health(&self) -> serde_json::Value {
        let records = self.repository.get_all();
        let count_with = |status: ImposterStatus| {
            records
                .iter()
                .filter(|r| r.config.status == status)
                .count()
        };
        serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime": self.started_at.elapsed().as_secs(),
            "memory": { "rss": rss_bytes() },
            "imposters": {
                "total": records.len(),
                "running": count_with(ImposterStatus::Running),
                "stopped": count_with(ImposterStatus::Stopped),
            },
            "ports": {
                "reserved": self.allocator.reserved_count(),
                "rangeCapacity": self.allocator.capacity(),
            },
        })
    }

    pub fn info(&self) -> serde_json::Value {
        serde_json::json!({
            "name": "effigy",
            "version": env!("CARGO_PKG_VERSION"),
            "configuration": self.settings,
            "features": ["imposters", "stubs", "templating", "proxy", "recording", "stats"],
        })
    }

    /// Pre-create and start imposters listed in the config file.
    pub async fn start_from_config(&self, imposters: Vec<StartupImposter>) -> Result<()> {
        for startup in imposters {
            let view = self.create_imposter(CreateImposter {
                name: startup.name,
                port: Some(startup.port),
                protocol: None,
                admin_path: None,
                proxy: startup.proxy,
                stubs: startup.stubs,
            })?;
            self.runtime.start(&view.config.id).await?;
            info!(
                "Started imposter {} from config on port {}",
                view.config.id, view.config.port
            );
        }
        Ok(())
    }

    /// Process shutdown: stop every listener.
    pub fn shutdown(&self) {
        self.runtime.stop_all();
    }
}

/// Best-effort resident-set size; 0 where unsupported.
#[cfg(target_os = "linux")]
fn rss_bytes() -> u64 {
    std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|statm| {
            statm
                .split_whitespace()
                .nth(1)
                .and_then(|pages| pages.parse::<u64>().ok())
        })
        .map(|pages| pages * 4096)
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn rss_bytes() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyForwarder;
    use crate::template::TemplateEngine;
    use serde_json::json;

    fn make_service() -> ImposterService {
        make_service_with(Settings {
            admin_port: 2525,
            port_range_min: 3000,
            port_range_max: 3010,
            max_imposters: 3,
            log_level: crate::config::LogLevel::Info,
        })
    }

    fn make_service_with(settings: Settings) -> ImposterService {
        let repository = Arc::new(ImposterRepository::new());
        let logger = Arc::new(RequestLogger::new());
        let stats = Arc::new(StatsAggregator::new());
        let runtime = Arc::new(ImposterRuntime::new(
            Arc::clone(&repository),
            Arc::clone(&logger),
            Arc::clone(&stats),
            Arc::new(ProxyForwarder::new()),
            Arc::new(TemplateEngine::new()),
        ));
        let allocator = Arc::new(PortAllocator::new(
            settings.port_range_min,
            settings.port_range_max,
        ));
        ImposterService::new(settings, allocator, repository, runtime, logger, stats)
    }

    fn stub_spec(path: &str) -> StubSpec {
        serde_json::from_value(json!({
            "predicates": [{"field": "path", "operator": "equals", "value": path}],
            "responses": [{"status": 200, "body": {"ok": true}}]
        }))
        .unwrap()
    }

    async fn free_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[test]
    fn test_create_defaults() {
        let service = make_service();
        let view = service.create_imposter(CreateImposter::default()).unwrap();
        assert_eq!(view.config.id.len(), 8);
        assert_eq!(view.config.name, view.config.id);
        assert_eq!(view.config.port, 3000);
        assert_eq!(view.config.status, ImposterStatus::Stopped);
        assert!(view.admin_url.contains("/imposters/"));
        assert_eq!(view.url, "http://localhost:3000");
    }

    #[test]
    fn test_create_with_preferred_port_conflict() {
        let service = make_service();
        service
            .create_imposter(CreateImposter {
                port: Some(6000),
                ..CreateImposter::default()
            })
            .unwrap();
        let err = service
            .create_imposter(CreateImposter {
                port: Some(6000),
                ..CreateImposter::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::PortConflict(6000)));
    }

    #[test]
    fn test_capacity_limit() {
        let service = make_service();
        for _ in 0..3 {
            service.create_imposter(CreateImposter::default()).unwrap();
        }
        let err = service.create_imposter(CreateImposter::default()).unwrap_err();
        assert!(matches!(err, Error::ServiceError(_)));
    }

    #[test]
    fn test_create_rejects_unknown_protocol() {
        let service = make_service();
        let err = service
            .create_imposter(CreateImposter {
                protocol: Some("TCP".to_string()),
                ..CreateImposter::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }

    #[test]
    fn test_create_rejects_bad_stub() {
        let service = make_service();
        let bad: StubSpec = serde_json::from_value(json!({
            "responses": [{"status": 600}]
        }))
        .unwrap();
        let err = service
            .create_imposter(CreateImposter {
                stubs: vec![bad],
                ..CreateImposter::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
        // Nothing leaked: the port range is untouched.
        let view = service.create_imposter(CreateImposter::default()).unwrap();
        assert_eq!(view.config.port, 3000);
    }

    #[tokio::test]
    async fn test_delete_guard_and_force() {
        let service = make_service();
        let port = free_port().await;
        let view = service
            .create_imposter(CreateImposter {
                port: Some(port),
                ..CreateImposter::default()
            })
            .unwrap();
        let id = view.config.id.clone();

        service
            .update_imposter(
                &id,
                UpdateImposter {
                    status: Some(ImposterStatus::Running),
                    ..UpdateImposter::default()
                },
            )
            .await
            .unwrap();

        let err = service.delete_imposter(&id, false).unwrap_err();
        assert!(matches!(err, Error::ImposterRunning(_)));

        service.delete_imposter(&id, true).unwrap();
        assert!(service.get_imposter(&id).is_err());

        // The port can immediately be reused.
        let again = service
            .create_imposter(CreateImposter {
                port: Some(port),
                ..CreateImposter::default()
            })
            .unwrap();
        assert_eq!(again.config.port, port);
    }

    #[test]
    fn test_delete_stopped_releases_port() {
        let service = make_service();
        let view = service.create_imposter(CreateImposter::default()).unwrap();
        service.delete_imposter(&view.config.id, false).unwrap();
        let next = service.create_imposter(CreateImposter::default()).unwrap();
        assert_eq!(next.config.port, 3000);
    }

    #[tokio::test]
    async fn test_update_name_and_proxy_removal() {
        let service = make_service();
        let view = service
            .create_imposter(CreateImposter {
                proxy: Some(ProxyConfig {
                    target_url: "http://up:8080".to_string(),
                    mode: Default::default(),
                    add_headers: Default::default(),
                    remove_headers: Default::default(),
                    follow_redirects: true,
                    timeout: 10_000,
                }),
                ..CreateImposter::default()
            })
            .unwrap();
        let id = view.config.id.clone();
        assert!(view.config.proxy.is_some());

        // Absent proxy field: unchanged
        let updated = service
            .update_imposter(
                &id,
                UpdateImposter {
                    name: Some("renamed".to_string()),
                    ..UpdateImposter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.config.name, "renamed");
        assert!(updated.config.proxy.is_some());

        // Explicit null: removed
        let patch: UpdateImposter = serde_json::from_str(r#"{"proxy": null}"#).unwrap();
        assert_eq!(patch.proxy, Some(None));
        let updated = service.update_imposter(&id, patch).await.unwrap();
        assert!(updated.config.proxy.is_none());
    }

    #[test]
    fn test_patch_proxy_double_option_deserialization() {
        let absent: UpdateImposter = serde_json::from_str(r#"{"name": "x"}"#).unwrap();
        assert!(absent.proxy.is_none());

        let null: UpdateImposter = serde_json::from_str(r#"{"proxy": null}"#).unwrap();
        assert_eq!(null.proxy, Some(None));

        let set: UpdateImposter =
            serde_json::from_str(r#"{"proxy": {"targetUrl": "http://up:1"}}"#).unwrap();
        assert!(matches!(set.proxy, Some(Some(_))));
    }

    #[tokio::test]
    async fn test_update_port_while_stopped() {
        let service = make_service();
        let view = service.create_imposter(CreateImposter::default()).unwrap();
        let id = view.config.id.clone();
        assert_eq!(view.config.port, 3000);

        let updated = service
            .update_imposter(
                &id,
                UpdateImposter {
                    port: Some(3005),
                    ..UpdateImposter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.config.port, 3005);

        // Old port was released: the next auto-assignment takes it.
        let next = service.create_imposter(CreateImposter::default()).unwrap();
        assert_eq!(next.config.port, 3000);
    }

    #[tokio::test]
    async fn test_update_port_conflict_rolls_back() {
        let service = make_service();
        let a = service.create_imposter(CreateImposter::default()).unwrap();
        let b = service.create_imposter(CreateImposter::default()).unwrap();

        let err = service
            .update_imposter(
                &b.config.id,
                UpdateImposter {
                    port: Some(a.config.port),
                    ..UpdateImposter::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PortConflict(_)));
        // b keeps its original port.
        assert_eq!(
            service.get_imposter(&b.config.id).unwrap().config.port,
            b.config.port
        );
    }

    #[tokio::test]
    async fn test_port_change_while_running_restarts_on_new_port() {
        let service = make_service();
        let port_a = free_port().await;
        let port_b = free_port().await;
        let view = service
            .create_imposter(CreateImposter {
                port: Some(port_a),
                stubs: vec![stub_spec("/ping")],
                ..CreateImposter::default()
            })
            .unwrap();
        let id = view.config.id.clone();

        service
            .update_imposter(
                &id,
                UpdateImposter {
                    status: Some(ImposterStatus::Running),
                    ..UpdateImposter::default()
                },
            )
            .await
            .unwrap();

        let updated = service
            .update_imposter(
                &id,
                UpdateImposter {
                    port: Some(port_b),
                    ..UpdateImposter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.config.port, port_b);
        assert_eq!(updated.config.status, ImposterStatus::Running);

        let response = reqwest::get(format!("http://127.0.0.1:{port_b}/ping"))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        service.delete_imposter(&id, true).unwrap();
    }

    #[tokio::test]
    async fn test_stub_crud_with_hot_reload() {
        let service = make_service();
        let port = free_port().await;
        let view = service
            .create_imposter(CreateImposter {
                port: Some(port),
                ..CreateImposter::default()
            })
            .unwrap();
        let id = view.config.id.clone();
        service
            .update_imposter(
                &id,
                UpdateImposter {
                    status: Some(ImposterStatus::Running),
                    ..UpdateImposter::default()
                },
            )
            .await
            .unwrap();

        // Added stub is served without a restart.
        let stub = service.add_stub(&id, stub_spec("/fresh")).unwrap();
        let response = reqwest::get(format!("http://127.0.0.1:{port}/fresh"))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        // Replace it; the id survives.
        let replaced = service
            .update_stub(&id, &stub.id, stub_spec("/moved"))
            .unwrap();
        assert_eq!(replaced.id, stub.id);
        let response = reqwest::get(format!("http://127.0.0.1:{port}/moved"))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let response = reqwest::get(format!("http://127.0.0.1:{port}/fresh"))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 404);

        // Remove it.
        service.remove_stub(&id, &stub.id).unwrap();
        assert!(service.get_stubs(&id).unwrap().is_empty());
        let response = reqwest::get(format!("http://127.0.0.1:{port}/moved"))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 404);

        service.delete_imposter(&id, true).unwrap();
    }

    #[test]
    fn test_requests_and_stats_unknown_imposter() {
        let service = make_service();
        assert!(matches!(
            service.get_requests("deadbeef", &LogFilter::default()),
            Err(Error::ImposterNotFound(_))
        ));
        assert!(service.clear_requests("deadbeef").is_err());
        assert!(service.get_stats("deadbeef").is_err());
        assert!(service.reset_stats("deadbeef").is_err());
    }

    #[test]
    fn test_list_pagination_and_filters() {
        let service = make_service();
        for _ in 0..3 {
            service.create_imposter(CreateImposter::default()).unwrap();
        }

        let (page, total) = service.list_imposters(&ListParams::default());
        assert_eq!(total, 3);
        assert_eq!(page.len(), 3);

        let (page, total) = service.list_imposters(&ListParams {
            limit: 2,
            offset: 2,
            ..ListParams::default()
        });
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);

        let (page, _) = service.list_imposters(&ListParams {
            status: Some(ImposterStatus::Running),
            ..ListParams::default()
        });
        assert!(page.is_empty());

        let (page, _) = service.list_imposters(&ListParams {
            protocol: Some("grpc".to_string()),
            ..ListParams::default()
        });
        assert!(page.is_empty());

        let (page, _) = service.list_imposters(&ListParams {
            protocol: Some("HTTP".to_string()),
            ..ListParams::default()
        });
        assert_eq!(page.len(), 3);
    }

    #[test]
    fn test_health_shape() {
        let service = make_service();
        service.create_imposter(CreateImposter::default()).unwrap();
        let health = service.health();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["imposters"]["total"], 1);
        assert_eq!(health["imposters"]["running"], 0);
        assert_eq!(health["ports"]["reserved"], 1);
        assert_eq!(health["ports"]["rangeCapacity"], 11);
    }

    #[test]
    fn test_info_shape() {
        let service = make_service();
        let info = service.info();
        assert_eq!(info["name"], "effigy");
        assert_eq!(info["configuration"]["adminPort"], 2525);
        assert!(info["features"].as_array().unwrap().len() >= 4);
    }
}

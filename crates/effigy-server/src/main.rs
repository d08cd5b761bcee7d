// Allow dead_code: the binary re-declares the library modules and only
// exercises part of their public surface.
#![allow(dead_code)]

//! Effigy - a programmable HTTP mocking service.
//!
//! # Examples
//!
//! ```bash
//! effigy start                          # Admin API on port 2525
//! effigy start --port 3535              # Admin API on port 3535
//! effigy start --config imposters.json  # Pre-create and start imposters
//! ```

mod admin;
mod config;
mod control;
mod error;
mod imposter;
mod metrics;
mod ports;
mod proxy;
mod repository;
mod request_log;
mod runtime;
mod stats;
mod tasks;
mod template;

use admin::AdminServer;
use clap::{Parser, Subcommand};
use config::{ConfigFile, Settings};
use control::ImposterService;
use ports::PortAllocator;
use proxy::ProxyForwarder;
use repository::ImposterRepository;
use request_log::RequestLogger;
use runtime::ImposterRuntime;
use stats::StatsAggregator;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use template::TemplateEngine;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Effigy - programmable HTTP mocking service
///
/// Starts an admin API (default port 2525) for creating imposters: mock
/// HTTP services with stub matching, templating, and a recording proxy.
#[derive(Parser, Debug)]
#[command(name = "effigy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the service (default command)
    Start {
        /// Port for the admin API
        #[arg(short = 'p', long, env = "ADMIN_PORT")]
        port: Option<u16>,

        /// Config file with admin settings and startup imposters
        #[arg(short = 'c', long, value_name = "FILE", env = "EFFIGY_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    let (port_override, config_path) = match cli.command {
        Some(Commands::Start { port, config }) => (port, config),
        None => (None, None),
    };

    // Resolve configuration: defaults < env < config file < CLI flags.
    let mut settings = Settings::from_env()?;
    let config_file = match &config_path {
        Some(path) => Some(ConfigFile::load(path)?),
        None => None,
    };
    if let Some(file) = &config_file {
        settings.apply_file(&file.admin)?;
    }
    if let Some(port) = port_override {
        settings.admin_port = port;
    }
    settings.validate()?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_str())),
        )
        .init();

    info!(
        "Starting effigy (admin port {}, imposter ports {}-{})",
        settings.admin_port, settings.port_range_min, settings.port_range_max
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        // Composition root: every service is a plain value wired up here.
        let repository = Arc::new(ImposterRepository::new());
        let logger = Arc::new(RequestLogger::new());
        let stats = Arc::new(StatsAggregator::new());
        let imposter_runtime = Arc::new(ImposterRuntime::new(
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
        let service = Arc::new(ImposterService::new(
            settings.clone(),
            allocator,
            repository,
            imposter_runtime,
            logger,
            stats,
        ));

        if let Some(file) = config_file {
            service.start_from_config(file.imposters).await?;
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], settings.admin_port));
        let shutdown = CancellationToken::new();

        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            info!("Shutdown signal received");
            signal_token.cancel();
        });

        AdminServer::new(addr, Arc::clone(&service))
            .run(shutdown)
            .await?;

        service.shutdown();
        info!("Shutdown complete");
        Ok(())
    })
}

/// Resolve on SIGINT or SIGTERM.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

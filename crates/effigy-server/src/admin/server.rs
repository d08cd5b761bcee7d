//! Admin API server.

use crate::admin::router::route_request;
use crate::control::ImposterService;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct AdminServer {
    addr: SocketAddr,
    service: Arc<ImposterService>,
}

impl AdminServer {
    pub fn new(addr: SocketAddr, service: Arc<ImposterService>) -> Self {
        Self { addr, service }
    }

    /// Run until the shutdown token fires. Bind failure is a startup error.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Admin API listening on http://{}", self.addr);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Admin API shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    let io = TokioIo::new(stream);
                    let service = Arc::clone(&self.service);

                    tokio::spawn(async move {
                        let handler = service_fn(move |req| {
                            let service = Arc::clone(&service);
                            async move { route_request(req, service).await }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, handler).await {
                            debug!("Admin API connection error: {}", e);
                        }
                    });
                }
            }
        }
    }
}

//! Error taxonomy for the imposter service.
//!
//! A closed sum type shared by every component; the admin adapter maps
//! variants to HTTP status codes at the boundary.

use hyper::StatusCode;

/// Errors surfaced by the imposter core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Imposter {0} not found")]
    ImposterNotFound(String),

    #[error("Stub {stub_id} not found on imposter {imposter_id}")]
    StubNotFound { imposter_id: String, stub_id: String },

    #[error("Port {0} is already reserved")]
    PortConflict(u16),

    #[error("No free ports available in range {min}-{max}")]
    PortExhausted { min: u16, max: u16 },

    /// Delete guard: the imposter must be stopped (or force passed) first.
    #[error("Imposter {0} is running; stop it first or pass force=true")]
    ImposterRunning(String),

    /// Listener bind failure or runtime crash.
    #[error("Imposter server error: {0}")]
    ImposterServerError(String),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// Capacity or configuration problem.
    #[error("{0}")]
    ServiceError(String),

    /// Schema rejection at the admin boundary.
    #[error("{0}")]
    ParseError(String),
}

/// Upstream forwarding failures.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    #[error("upstream timed out after {0}ms")]
    TimedOut(u64),
}

impl Error {
    /// HTTP status the admin adapter responds with for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::ImposterNotFound(_) | Error::StubNotFound { .. } => StatusCode::NOT_FOUND,
            Error::PortConflict(_) | Error::ImposterRunning(_) => StatusCode::CONFLICT,
            Error::PortExhausted { .. }
            | Error::ImposterServerError(_)
            | Error::ServiceError(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Proxy(_) => StatusCode::BAD_GATEWAY,
            Error::ParseError(_) => StatusCode::BAD_REQUEST,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

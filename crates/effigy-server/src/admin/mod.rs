//! Admin HTTP surface: thin adapters around the control service.

pub mod handlers;
pub mod router;
pub mod server;
pub mod types;

pub use server::AdminServer;

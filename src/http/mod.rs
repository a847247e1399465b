//! # HTTP Status Surface
//!
//! Read-only axum endpoints for a running node.
//!
//! # Endpoints
//!
//! - `/health` - Liveness
//! - `/ha/node` - This node's reported status and priority
//! - `/ha/state` - The plane as this node sees it
//! - `/ha/metrics` - Coordinator counters

mod config;
mod routes;
mod server;

pub use config::HttpServerConfig;
pub use routes::{ha_routes, health_routes, HealthResponse, NodeStatusResponse};
pub use server::HttpServer;

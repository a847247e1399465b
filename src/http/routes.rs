//! HA status routes
//!
//! Read-only views of one coordinator. Nothing here changes node state.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::ha::{HaCoordinator, ManagementPlaneSyncRecord};
use crate::observability::HaMetricsSnapshot;

// ==================
// Response Types
// ==================

#[derive(Debug, Serialize)]
pub struct NodeStatusResponse {
    pub node_id: String,
    pub status: String,
    pub running: bool,
    pub priority: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

// ==================
// Routes
// ==================

/// Create HA status routes
pub fn ha_routes(coordinator: Arc<HaCoordinator>) -> Router {
    Router::new()
        .route("/state", get(plane_state_handler))
        .route("/node", get(node_status_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(coordinator)
}

/// Liveness route, independent of HA state
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_handler))
}

// ==================
// Handlers
// ==================

async fn plane_state_handler(
    State(coordinator): State<Arc<HaCoordinator>>,
) -> Json<ManagementPlaneSyncRecord> {
    // loads go through the persister, which may block on disk
    let view = tokio::task::spawn_blocking(move || coordinator.get_management_plane_sync_state())
        .await
        .unwrap_or_default();
    Json(view)
}

async fn node_status_handler(
    State(coordinator): State<Arc<HaCoordinator>>,
) -> Json<NodeStatusResponse> {
    Json(NodeStatusResponse {
        node_id: coordinator.node_id().to_string(),
        status: coordinator.get_node_state().state_name().to_string(),
        running: coordinator.is_running(),
        priority: coordinator.priority(),
    })
}

async fn metrics_handler(State(coordinator): State<Arc<HaCoordinator>>) -> Json<HaMetricsSnapshot> {
    Json(coordinator.metrics().snapshot())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::ha::{HighAvailabilityMode, VirtualClock};
    use crate::persist::{InMemoryPersister, InMemoryPlaneStore};

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn started_master() -> Arc<HaCoordinator> {
        let store = InMemoryPlaneStore::new();
        let coordinator = HaCoordinator::new("node-a")
            .with_persister(Arc::new(InMemoryPersister::new(store)))
            .with_clock(Arc::new(VirtualClock::new(1_000_000)))
            .with_poll_period(None)
            .with_priority(3);
        coordinator.start(HighAvailabilityMode::Auto).unwrap();
        Arc::new(coordinator)
    }

    #[tokio::test]
    async fn test_node_route() {
        let (status, json) = get_json(ha_routes(started_master()), "/node").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["node_id"], "node-a");
        assert_eq!(json["status"], "MASTER");
        assert_eq!(json["priority"], 3);
    }

    #[tokio::test]
    async fn test_state_route() {
        let (status, json) = get_json(ha_routes(started_master()), "/state").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["master_node_id"], "node-a");
        assert_eq!(json["management_nodes"]["node-a"]["status"], "MASTER");
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let (_, json) = get_json(ha_routes(started_master()), "/metrics").await;
        assert_eq!(json["promotions"], 1);
    }

    #[tokio::test]
    async fn test_health_route() {
        let (status, json) = get_json(health_routes(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }
}

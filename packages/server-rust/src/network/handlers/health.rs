//! Health, liveness, and readiness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tracing::warn;

use super::AppState;
use crate::network::HealthState;

/// Returns detailed health information as JSON.
///
/// Always 200. The `state` and `store` fields say whether the gateway can
/// actually take submissions. Counter and queue figures are `null` when the
/// store cannot be read.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let health = state.shutdown.health_state();
    let store = match state.gateway.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!(error = %e, "store ping failed");
            "unreachable"
        }
    };
    let snapshot = state.gateway.snapshot().await.ok();

    Json(json!({
        "state": health.as_str(),
        "store": store,
        "active_requests": snapshot.map(|s| s.active_requests),
        "queues": snapshot.map(|s| s.queues),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe. Always 200 while the process answers at all.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe. 200 only when serving and the store answers a ping.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() != HealthState::Ready {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match state.gateway.ping().await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use serde_json::json;

    use super::*;
    use crate::network::ShutdownController;
    use crate::service::{ServiceConfig, SubmissionGateway};
    use crate::storage::MemoryStore;

    fn test_state() -> AppState {
        AppState {
            gateway: SubmissionGateway::new(
                Arc::new(MemoryStore::new()),
                &ServiceConfig::default(),
            ),
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn health_handler_returns_json_with_all_fields() {
        let state = test_state();
        state.shutdown.set_ready();

        let json = health_handler(State(state)).await.0;

        assert_eq!(json["state"], "ready");
        assert_eq!(json["store"], "ok");
        assert_eq!(json["active_requests"], 0);
        assert_eq!(json["queues"], json!({"sync": 0, "async": 0}));
        assert_eq!(json["in_flight"], 0);
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_handler_reports_admitted_work() {
        let state = test_state();
        state
            .gateway
            .submit_async("a", json!({}))
            .await
            .unwrap();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["active_requests"], 1);
        assert_eq!(json["queues"]["async"], 1);
    }

    #[tokio::test]
    async fn health_handler_reports_draining_state() {
        let state = test_state();
        state.shutdown.set_ready();
        state.shutdown.begin_drain();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["state"], "draining");
    }

    #[tokio::test]
    async fn health_handler_reports_in_flight_count() {
        let state = test_state();
        let _guard = state.shutdown.in_flight_guard();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["in_flight"], 1);
    }

    #[tokio::test]
    async fn liveness_handler_always_returns_200() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_handler_returns_200_when_ready() {
        let state = test_state();
        state.shutdown.set_ready();
        assert_eq!(readiness_handler(State(state)).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_handler_returns_503_when_starting() {
        let state = test_state();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn readiness_handler_returns_503_when_draining() {
        let state = test_state();
        state.shutdown.set_ready();
        state.shutdown.begin_drain();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}

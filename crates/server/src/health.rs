use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Readiness facts recorded during startup.
#[derive(Clone, Debug)]
pub struct HealthState {
    pub app_name: String,
    pub started_at: DateTime<Utc>,
    pub registered_webhooks: Arc<AtomicUsize>,
}

impl HealthState {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            started_at: Utc::now(),
            registered_webhooks: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub webhooks: HealthCheck,
    pub started_at: String,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let registered = state.registered_webhooks.load(Ordering::Relaxed);
    let webhooks = if registered > 0 {
        HealthCheck { status: "ready", detail: format!("{registered} webhooks registered") }
    } else {
        HealthCheck { status: "pending", detail: "no webhooks registered yet".to_string() }
    };

    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: format!("{} webhook listener running", state.app_name),
        },
        webhooks,
        started_at: state.started_at.to_rfc3339(),
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use axum::{extract::State, http::StatusCode, Json};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_is_ready_before_webhooks_are_registered() {
        let (status, Json(payload)) = health(State(HealthState::new("cob"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.webhooks.status, "pending");
        assert!(payload.service.detail.starts_with("cob"));
    }

    #[tokio::test]
    async fn health_reports_registered_webhooks() {
        let state = HealthState::new("cob");
        state.registered_webhooks.store(2, Ordering::Relaxed);

        let (_, Json(payload)) = health(State(state)).await;

        assert_eq!(payload.webhooks.status, "ready");
        assert_eq!(payload.webhooks.detail, "2 webhooks registered");
    }
}

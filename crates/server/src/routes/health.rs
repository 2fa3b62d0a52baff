use axum::{Json, extract::State};

use taskdeck_api::{HealthResponse, service};

use crate::AppState;

/// GET /api/health: liveness, uptime and mail queue counters.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: service::now_timestamp(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        mail: state.mail.stats(),
    })
}

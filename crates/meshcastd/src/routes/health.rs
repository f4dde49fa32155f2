//! Health, readiness, and stats endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::queue::QueueStatsSnapshot;
use crate::scheduler::SchedulerStats;
use crate::state::AppState;
use crate::transport::PublishStatsSnapshot;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    transport: &'static str,
}

/// Readiness check (can we reach the broker?)
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<Json<ReadyResponse>, StatusCode> {
    let publisher = state.propagator.message_queue().publisher();

    if publisher.ping().await {
        Ok(Json(ReadyResponse {
            status: "ready",
            transport: publisher.name(),
        }))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[derive(Serialize)]
pub struct StatsResponse {
    server_id: String,
    uptime_secs: u64,
    scheduler: SchedulerStats,
    publishes: PublishStatsSnapshot,
    broadcasts: QueueStatsSnapshot,
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        server_id: state.config.server_id.clone(),
        uptime_secs: state.uptime_secs(),
        scheduler: state.scheduler.stats(),
        publishes: state.propagator.message_queue().stats(),
        broadcasts: state.propagator.broadcasts().stats(),
    })
}

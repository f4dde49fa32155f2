//! Operator triggers for the publishers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use meshcast_common::{MeshcastError, Metrics};
use serde::Serialize;
use thiserror::Error;

use crate::state::AppState;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Disabled(&'static str),

    /// Publish or lookup failed past the coordinator
    #[error("{0}")]
    Upstream(MeshcastError),
}

impl From<MeshcastError> for ApiError {
    fn from(err: MeshcastError) -> Self {
        if err.is_not_found() {
            Self::NotFound(err.to_string())
        } else {
            Self::Upstream(err)
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Disabled(_) => StatusCode::CONFLICT,
            Self::Upstream(MeshcastError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
pub struct PublishResponse {
    target: String,
    status: &'static str,
}

fn published(target: String) -> Json<PublishResponse> {
    Json(PublishResponse {
        target,
        status: "published",
    })
}

/// Resync every node in a network
pub async fn publish_network_peers(
    State(state): State<AppState>,
    Path(network): Path<String>,
) -> Result<Json<PublishResponse>, ApiError> {
    tracing::info!(network = %network, "Operator requested network peer update");
    state.propagator.publish_peer_update(&network, false).await?;
    Ok(published(network))
}

/// Push a node's record to its agent
pub async fn publish_node_update(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Json<PublishResponse>, ApiError> {
    let node = state.propagator.registry().node(&node_id).await?;
    state.propagator.node_update(&node).await?;
    Ok(published(node_id))
}

/// Peer update for a node whose external peers changed
pub async fn publish_ext_peers(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Json<PublishResponse>, ApiError> {
    let node = state.propagator.registry().node(&node_id).await?;
    state.propagator.publish_ext_peer_update(&node).await?;
    Ok(published(node_id))
}

/// Forward a metrics snapshot to the exporter
pub async fn push_metrics(
    State(state): State<AppState>,
    Json(metrics): Json<Metrics>,
) -> Result<Json<PublishResponse>, ApiError> {
    if !state.config.metrics_exporter {
        return Err(ApiError::Disabled("metrics exporter is disabled"));
    }
    state.propagator.push_metrics(&metrics).await?;
    Ok(published(metrics.node_id))
}

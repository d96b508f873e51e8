//! Stray intake and manual status changes.

use crate::extractors::{ApiJson, ApiPath, CorrelationId};
use crate::state::AppState;
use crate::WebResult;
use animal_control_core::{EntityStore, NewStray, StrayAnimal, StrayId, StrayStatus};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde::Deserialize;

/// Body of `PUT /api/strays/{id}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct StrayStatusBody {
    /// `observation`, `adoption` or `euthanized`
    pub status: String,
}

/// Record a capture. Responds `201`.
pub async fn capture<S: EntityStore + 'static>(
    State(state): State<AppState<S>>,
    ApiJson(stray): ApiJson<NewStray>,
) -> WebResult<(StatusCode, Json<StrayAnimal>)> {
    let stray = state.strays.capture(stray).await?;
    Ok((StatusCode::CREATED, Json(stray)))
}

/// Fetch one stray.
pub async fn get<S: EntityStore + 'static>(
    State(state): State<AppState<S>>,
    ApiPath(id): ApiPath<i64>,
) -> WebResult<Json<StrayAnimal>> {
    Ok(Json(state.strays.get(StrayId::new(id)).await?))
}

/// Move a stray along by hand.
///
/// `adopted` and `claimed` are only reachable through approval and claim.
pub async fn update_status<S: EntityStore + 'static>(
    State(state): State<AppState<S>>,
    correlation_id: CorrelationId,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<StrayStatusBody>,
) -> WebResult<Json<StrayAnimal>> {
    let status = StrayStatus::parse(&body.status)?;
    let stray = state.strays.update_status(StrayId::new(id), status).await?;
    tracing::info!(
        correlation_id = %correlation_id.0,
        stray_id = id,
        status = %stray.status,
        "Stray status updated"
    );
    Ok(Json(stray))
}

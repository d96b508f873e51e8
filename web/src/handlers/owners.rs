//! Owner records, pet lookups and counter maintenance.

use crate::error::AppError;
use crate::extractors::{ApiJson, ApiPath, ApiQuery, CorrelationId};
use crate::state::AppState;
use crate::WebResult;
use animal_control_core::{
    EntityStore, HardwareTag, NewOwner, Owner, OwnerId, Pet, PetCountCorrection,
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

/// Query of `GET /api/pets`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PetQuery {
    /// Hardware tag to look up
    pub tag: Option<String>,
}

/// Query of `POST /api/owners/pet-counts/recompute`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RecomputeParams {
    /// Limit the recompute to one owner
    pub owner_id: Option<i64>,
}

/// Response of the recompute endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecomputeResponse {
    /// Owners whose counter was rewritten
    pub corrections: Vec<PetCountCorrection>,
}

/// Register an owner. Responds `201`.
pub async fn register<S: EntityStore + 'static>(
    State(state): State<AppState<S>>,
    ApiJson(owner): ApiJson<NewOwner>,
) -> WebResult<(StatusCode, Json<Owner>)> {
    let owner = state.owners.register(owner).await?;
    Ok((StatusCode::CREATED, Json(owner)))
}

/// Fetch one owner.
pub async fn get<S: EntityStore + 'static>(
    State(state): State<AppState<S>>,
    ApiPath(id): ApiPath<i64>,
) -> WebResult<Json<Owner>> {
    Ok(Json(state.owners.get(OwnerId::new(id)).await?))
}

/// Pet rows for a tag. An unknown tag yields an empty list.
pub async fn pets_by_tag<S: EntityStore + 'static>(
    State(state): State<AppState<S>>,
    ApiQuery(query): ApiQuery<PetQuery>,
) -> WebResult<Json<Vec<Pet>>> {
    let raw = query
        .tag
        .ok_or_else(|| AppError::bad_request("tag query parameter is required"))?;
    let tag = HardwareTag::parse(&raw)?;
    Ok(Json(state.owners.pets_by_tag(&tag).await?))
}

/// Rebuild `pet_count` from the pet rows.
pub async fn recompute_pet_counts<S: EntityStore + 'static>(
    State(state): State<AppState<S>>,
    correlation_id: CorrelationId,
    ApiQuery(params): ApiQuery<RecomputeParams>,
) -> WebResult<Json<RecomputeResponse>> {
    let corrections = state
        .owners
        .recompute_pet_counts(params.owner_id.map(OwnerId::new))
        .await?;
    tracing::info!(
        correlation_id = %correlation_id.0,
        corrected = corrections.len(),
        "Pet counters recomputed"
    );
    Ok(Json(RecomputeResponse { corrections }))
}

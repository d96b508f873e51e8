//! Route table.

use crate::handlers::{self, owners, requests, strays};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use animal_control_core::EntityStore;
use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

/// Build the application router.
///
/// # Routes
///
/// - `POST /api/requests/:kind` - submit (`kind` is `adoption` or `redemption`)
/// - `GET /api/requests/:kind` - list, filtered by `requester_id` and `status`
/// - `GET /api/requests/:kind/:id` - fetch
/// - `PUT /api/requests/:kind/:id` - approve or reject
/// - `POST /api/requests/:kind/:id/claim` - hand the animal over
/// - `POST /api/strays`, `GET /api/strays/:id`, `PUT /api/strays/:id/status`
/// - `POST /api/owners`, `GET /api/owners/:id`
/// - `POST /api/owners/pet-counts/recompute`
/// - `GET /api/pets?tag=`
/// - `GET /health`
pub fn router<S: EntityStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route(
            "/api/requests/:kind",
            post(requests::submit::<S>).get(requests::list::<S>),
        )
        .route(
            "/api/requests/:kind/:id",
            get(requests::get::<S>).put(requests::set_status::<S>),
        )
        .route("/api/requests/:kind/:id/claim", post(requests::claim::<S>))
        .route("/api/strays", post(strays::capture::<S>))
        .route("/api/strays/:id", get(strays::get::<S>))
        .route("/api/strays/:id/status", put(strays::update_status::<S>))
        .route("/api/owners", post(owners::register::<S>))
        .route("/api/owners/:id", get(owners::get::<S>))
        .route(
            "/api/owners/pet-counts/recompute",
            post(owners::recompute_pet_counts::<S>),
        )
        .route("/api/pets", get(owners::pets_by_tag::<S>))
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
}

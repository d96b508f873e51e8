//! Application state for Axum handlers.

use animal_control_core::environment::Clock;
use animal_control_core::{
    ClaimService, EntityStore, OwnerService, RequestLifecycleService, StrayService,
};
use std::sync::Arc;

/// Services shared across all HTTP handlers.
///
/// Every service runs against the same store, so a request, the stray it
/// names and the resulting pet row are always written through one backend.
pub struct AppState<S> {
    /// Intake and manual status changes
    pub strays: StrayService<S>,
    /// Owner records and counters
    pub owners: OwnerService<S>,
    /// Submit and review
    pub requests: RequestLifecycleService<S>,
    /// Handover
    pub claims: ClaimService<S>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            strays: self.strays.clone(),
            owners: self.owners.clone(),
            requests: self.requests.clone(),
            claims: self.claims.clone(),
        }
    }
}

impl<S: EntityStore> AppState<S> {
    /// Build every service over one store and clock.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            strays: StrayService::new(Arc::clone(&store), Arc::clone(&clock)),
            owners: OwnerService::new(Arc::clone(&store), Arc::clone(&clock)),
            requests: RequestLifecycleService::new(Arc::clone(&store), Arc::clone(&clock)),
            claims: ClaimService::new(store, clock),
        }
    }
}

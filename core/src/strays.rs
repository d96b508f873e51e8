//! Stray intake and manual status changes.

use crate::environment::Clock;
use crate::error::{DispositionError, Result};
use crate::lifecycle::StrayStatus;
use crate::store::{EntityStore, StoreTransaction};
use crate::types::{NewStray, RequestKind, StrayAnimal, StrayId};
use std::sync::Arc;

/// Records captures and moves strays between the operator-controlled
/// statuses.
pub struct StrayService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for StrayService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: EntityStore> StrayService<S> {
    /// Create a service over `store`.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Record a capture. The stray starts in `captured`.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `species` is blank
    /// - `Conflict` if the tag already belongs to another stray
    #[tracing::instrument(skip(self, stray), fields(species = %stray.species))]
    pub async fn capture(&self, stray: NewStray) -> Result<StrayAnimal> {
        let stray = stray.validate()?;
        let mut tx = self.store.begin().await?;

        if let Some(tag) = &stray.hardware_tag {
            if let Some(holder) = tx.find_stray_by_tag(tag).await? {
                return Err(DispositionError::conflict(format!(
                    "hardware tag {tag} already belongs to stray {}",
                    holder.id
                )));
            }
        }

        let stray = tx.insert_stray(stray, self.clock.now()).await?;
        tx.commit().await?;
        tracing::info!(stray_id = %stray.id, tag = ?stray.hardware_tag, "stray captured");
        Ok(stray)
    }

    /// Read one stray.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it does not exist.
    pub async fn get(&self, id: StrayId) -> Result<StrayAnimal> {
        let mut tx = self.store.begin().await?;
        let stray = tx
            .find_stray(id)
            .await?
            .ok_or_else(|| DispositionError::not_found("stray", id))?;
        tx.commit().await?;
        Ok(stray)
    }

    /// Move a stray to `observation`, `adoption` or `euthanized`.
    ///
    /// Listing an animal for adoption deletes its outstanding redemption
    /// requests. Euthanizing it rejects every open request of both kinds.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the stray does not exist
    /// - `Conflict` if `status` is reserved for approval/claim or the move is
    ///   not a legal transition
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, id: StrayId, status: StrayStatus) -> Result<StrayAnimal> {
        if !status.is_manual_target() {
            return Err(DispositionError::conflict(format!(
                "status {status} is only reached through approval or claim"
            )));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let stray = tx
            .lock_stray(id)
            .await?
            .ok_or_else(|| DispositionError::not_found("stray", id))?;
        let next = stray.status.transition(status)?;
        tx.set_stray_status(id, next, now).await?;

        match next {
            StrayStatus::Adoption => {
                let removed = tx.delete_redemptions(id).await?;
                tracing::debug!(stray_id = %id, removed, "redemption requests removed");
            }
            StrayStatus::Euthanized => {
                let adoptions = tx.reject_open_requests(RequestKind::Adoption, id, now).await?;
                let redemptions = tx
                    .reject_open_requests(RequestKind::Redemption, id, now)
                    .await?;
                tracing::debug!(stray_id = %id, adoptions, redemptions, "open requests rejected");
            }
            _ => {}
        }

        tx.commit().await?;
        tracing::info!(stray_id = %id, from = %stray.status, to = %next, "stray status updated");
        Ok(StrayAnimal {
            status: next,
            updated_at: now,
            ..stray
        })
    }
}

//! Owner registration, pet lookup and counter recomputation.

use crate::environment::Clock;
use crate::error::{DispositionError, Result};
use crate::store::{EntityStore, StoreTransaction};
use crate::types::{HardwareTag, NewOwner, Owner, OwnerId, Pet, PetCountCorrection};
use std::sync::Arc;

/// Owner-side operations.
pub struct OwnerService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for OwnerService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: EntityStore> OwnerService<S> {
    /// Create a service over `store`.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Register an owner with no pets.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `full_name` is blank.
    pub async fn register(&self, owner: NewOwner) -> Result<Owner> {
        let owner = owner.validate()?;
        let mut tx = self.store.begin().await?;
        let owner = tx.insert_owner(owner, self.clock.now()).await?;
        tx.commit().await?;
        tracing::info!(owner_id = %owner.id, "owner registered");
        Ok(owner)
    }

    /// Read one owner.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it does not exist.
    pub async fn get(&self, id: OwnerId) -> Result<Owner> {
        let mut tx = self.store.begin().await?;
        let owner = tx
            .find_owner(id)
            .await?
            .ok_or_else(|| DispositionError::not_found("owner", id))?;
        tx.commit().await?;
        Ok(owner)
    }

    /// Pet rows carrying `tag`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `Internal` on storage failure.
    pub async fn pets_by_tag(&self, tag: &HardwareTag) -> Result<Vec<Pet>> {
        let mut tx = self.store.begin().await?;
        let pets = tx.find_pets_by_tag(tag).await?;
        tx.commit().await?;
        Ok(pets)
    }

    /// Reset `pet_count` to the number of pet rows each owner really holds.
    ///
    /// This is the authoritative repair for the incremental adjustments made
    /// by claims, which are best-effort.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `owner` is given and does not exist
    /// - `Internal` on storage failure
    #[tracing::instrument(skip(self))]
    pub async fn recompute_pet_counts(
        &self,
        owner: Option<OwnerId>,
    ) -> Result<Vec<PetCountCorrection>> {
        let mut tx = self.store.begin().await?;
        if let Some(id) = owner {
            if tx.find_owner(id).await?.is_none() {
                return Err(DispositionError::not_found("owner", id));
            }
        }
        let corrections = tx.recompute_pet_counts(owner).await?;
        tx.commit().await?;

        for correction in &corrections {
            tracing::info!(
                owner_id = %correction.owner_id,
                previous = correction.previous,
                actual = correction.actual,
                "pet_count corrected"
            );
        }
        metrics::counter!("disposition.pet_count.corrections")
            .increment(u64::try_from(corrections.len()).unwrap_or(u64::MAX));
        Ok(corrections)
    }
}

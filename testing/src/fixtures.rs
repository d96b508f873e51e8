//! Scenario builders shared by service, store and HTTP tests.
//!
//! [`Harness`] wires every service to one store and a fixed clock, and
//! offers shortcuts for the states tests usually start from ("a stray
//! listed for adoption", "an approved redemption", "legacy pet rows for a
//! tag"). It is generic over the store so the same scenarios run against
//! the in-memory store and against Postgres.

use crate::mocks::test_clock;
use animal_control_core::environment::Clock;
use animal_control_core::error::Result;
use animal_control_core::lifecycle::{RequestStatus, StrayStatus};
use animal_control_core::store::{EntityStore, StoreTransaction};
use animal_control_core::types::{
    ClaimCommand, ClaimReceipt, DispositionRequest, HardwareTag, NewOwner, NewPet, NewStray, Owner,
    OwnerId, Pet, PetDescription, PetStatus, RequestDetails, RequestId, RequestKind, StrayAnimal,
    StrayId,
};
use animal_control_core::{ClaimService, OwnerService, RequestLifecycleService, StrayService};
use std::sync::Arc;

/// Every service over one store.
pub struct Harness<S> {
    /// The store, for direct seeding and inspection
    pub store: Arc<S>,
    /// Clock shared by the services
    pub clock: Arc<dyn Clock>,
    /// Intake and manual status changes
    pub strays: StrayService<S>,
    /// Owners, pets, counters
    pub owners: OwnerService<S>,
    /// Submit and review
    pub requests: RequestLifecycleService<S>,
    /// Claims
    pub claims: ClaimService<S>,
}

impl<S: EntityStore> Harness<S> {
    /// Wire services to `store` with the fixed test clock.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_clock(Arc::new(store), Arc::new(test_clock()))
    }

    /// Wire services to a shared store and clock.
    #[must_use]
    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            strays: StrayService::new(Arc::clone(&store), Arc::clone(&clock)),
            owners: OwnerService::new(Arc::clone(&store), Arc::clone(&clock)),
            requests: RequestLifecycleService::new(Arc::clone(&store), Arc::clone(&clock)),
            claims: ClaimService::new(Arc::clone(&store), Arc::clone(&clock)),
            store,
            clock,
        }
    }

    /// Register an owner.
    ///
    /// # Errors
    ///
    /// Propagates service errors.
    pub async fn owner(&self, name: &str) -> Result<Owner> {
        self.owners
            .register(NewOwner {
                full_name: name.to_string(),
                phone: Some("555-0100".to_string()),
                ..NewOwner::default()
            })
            .await
    }

    /// Capture a dog, optionally tagged.
    ///
    /// # Errors
    ///
    /// Propagates service errors.
    pub async fn capture(&self, tag: Option<&str>) -> Result<StrayAnimal> {
        let hardware_tag = tag.map(HardwareTag::parse).transpose()?;
        self.strays
            .capture(NewStray {
                species: "dog".to_string(),
                breed: Some("mixed".to_string()),
                markings: Some("brown, white chest".to_string()),
                hardware_tag,
                ..NewStray::default()
            })
            .await
    }

    /// Capture a dog and walk it to `status` through manual updates.
    ///
    /// Only `captured`, `observation`, `adoption` and `euthanized` can be
    /// reached this way.
    ///
    /// # Errors
    ///
    /// Propagates service errors.
    pub async fn stray_in(&self, status: StrayStatus, tag: Option<&str>) -> Result<StrayAnimal> {
        let mut stray = self.capture(tag).await?;
        let path: &[StrayStatus] = match status {
            StrayStatus::Observation => &[StrayStatus::Observation],
            StrayStatus::Adoption => &[StrayStatus::Observation, StrayStatus::Adoption],
            StrayStatus::Euthanized => &[StrayStatus::Euthanized],
            _ => &[],
        };
        for next in path {
            stray = self.strays.update_status(stray.id, *next).await?;
        }
        Ok(stray)
    }

    /// Insert a pet row directly, as legacy data would have it.
    ///
    /// The owner's counter is bumped to match.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn seed_pet(&self, owner: OwnerId, tag: &str) -> Result<Pet> {
        let mut tx = self.store.begin().await?;
        let pet = tx
            .insert_pet(
                NewPet {
                    owner_id: owner,
                    hardware_tag: Some(HardwareTag::parse(tag)?),
                    description: PetDescription {
                        species: Some("dog".to_string()),
                        ..PetDescription::default()
                    },
                    status: PetStatus::Missing,
                },
                self.clock.now(),
            )
            .await?;
        tx.adjust_pet_count(owner, 1).await?;
        tx.commit().await?;
        Ok(pet)
    }

    /// Submit an empty request of `kind`.
    ///
    /// # Errors
    ///
    /// Propagates service errors.
    pub async fn submit(
        &self,
        kind: RequestKind,
        stray: StrayId,
        requester: OwnerId,
    ) -> Result<DispositionRequest> {
        self.requests
            .submit(stray, requester, RequestDetails::empty(kind))
            .await
    }

    /// Submit and approve a request of `kind`.
    ///
    /// # Errors
    ///
    /// Propagates service errors.
    pub async fn approved(
        &self,
        kind: RequestKind,
        stray: StrayId,
        requester: OwnerId,
    ) -> Result<DispositionRequest> {
        let request = self.submit(kind, stray, requester).await?;
        self.requests
            .set_status(kind, request.id, RequestStatus::Approved)
            .await
    }

    /// Claim a request.
    ///
    /// # Errors
    ///
    /// Propagates service errors.
    pub async fn claim(
        &self,
        kind: RequestKind,
        request_id: RequestId,
        tag: Option<&str>,
        manual_entry: bool,
    ) -> Result<ClaimReceipt> {
        self.claims
            .claim(ClaimCommand {
                kind,
                request_id,
                hardware_tag: tag.map(HardwareTag::parse).transpose()?,
                manual_entry,
            })
            .await
    }

    /// Pet rows for a tag.
    ///
    /// # Errors
    ///
    /// Propagates service errors.
    pub async fn pets(&self, tag: &str) -> Result<Vec<Pet>> {
        self.owners.pets_by_tag(&HardwareTag::parse(tag)?).await
    }

    /// An owner's stored counter.
    ///
    /// # Errors
    ///
    /// Propagates service errors.
    pub async fn pet_count(&self, owner: OwnerId) -> Result<i32> {
        Ok(self.owners.get(owner).await?.pet_count)
    }
}

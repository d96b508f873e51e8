//! In-memory entity store.
//!
//! [`InMemoryEntityStore`] keeps the five tables in one map set behind a
//! `tokio::sync::Mutex`. A transaction holds the mutex for its whole
//! lifetime and works on a copy of the tables; `commit` writes the copy
//! back, dropping the transaction discards it. Transactions are therefore
//! fully serialised, which is stronger than row locking and gives the same
//! observable outcomes for the service operations.

use animal_control_core::error::{DispositionError, Result};
use animal_control_core::lifecycle::{RequestStatus, StrayStatus};
use animal_control_core::store::{EntityStore, StoreTransaction};
use animal_control_core::types::{
    DispositionRequest, HardwareTag, NewOwner, NewPet, NewRequest, NewStray, Owner, OwnerId, Pet,
    PetCountCorrection, PetId, RequestFilter, RequestId, RequestKind, RequestListing, StrayAnimal,
    StrayId,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug, Default)]
struct Tables {
    strays: BTreeMap<StrayId, StrayAnimal>,
    owners: BTreeMap<OwnerId, Owner>,
    pets: BTreeMap<PetId, Pet>,
    adoptions: BTreeMap<RequestId, DispositionRequest>,
    redemptions: BTreeMap<RequestId, DispositionRequest>,
    last_stray: i64,
    last_owner: i64,
    last_pet: i64,
    last_adoption: i64,
    last_redemption: i64,
}

impl Tables {
    fn requests(&self, kind: RequestKind) -> &BTreeMap<RequestId, DispositionRequest> {
        match kind {
            RequestKind::Adoption => &self.adoptions,
            RequestKind::Redemption => &self.redemptions,
        }
    }

    fn requests_mut(
        &mut self,
        kind: RequestKind,
    ) -> &mut BTreeMap<RequestId, DispositionRequest> {
        match kind {
            RequestKind::Adoption => &mut self.adoptions,
            RequestKind::Redemption => &mut self.redemptions,
        }
    }

    fn stray_with_tag(&self, tag: &HardwareTag) -> Option<&StrayAnimal> {
        self.strays
            .values()
            .find(|stray| stray.hardware_tag.as_ref() == Some(tag))
    }

    fn pets_with_tag(&self, tag: &HardwareTag) -> Vec<Pet> {
        self.pets
            .values()
            .filter(|pet| pet.hardware_tag.as_ref() == Some(tag))
            .cloned()
            .collect()
    }
}

/// Transactional in-memory implementation of [`EntityStore`].
///
/// Cloning shares the underlying tables.
///
/// # Example
///
/// ```
/// use animal_control_testing::InMemoryEntityStore;
/// use animal_control_core::store::{EntityStore, StoreTransaction};
/// use animal_control_core::types::NewOwner;
/// use chrono::Utc;
///
/// # async fn example() -> animal_control_core::Result<()> {
/// let store = InMemoryEntityStore::new();
/// let mut tx = store.begin().await?;
/// let owner = tx
///     .insert_owner(NewOwner { full_name: "Ada".into(), ..NewOwner::default() }, Utc::now())
///     .await?;
/// tx.commit().await?;
/// assert_eq!(owner.pet_count, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEntityStore {
    tables: Arc<Mutex<Tables>>,
    fail_counter_adjustments: Arc<AtomicBool>,
}

impl InMemoryEntityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `adjust_pet_count` call fail until switched off again.
    ///
    /// Used to exercise the best-effort counter path.
    pub fn fail_counter_adjustments(&self, fail: bool) {
        self.fail_counter_adjustments.store(fail, Ordering::SeqCst);
    }

    /// Number of committed pet rows, across all tags.
    pub async fn pet_rows(&self) -> usize {
        self.tables.lock().await.pets.len()
    }

    /// Number of committed requests of a kind.
    pub async fn request_rows(&self, kind: RequestKind) -> usize {
        self.tables.lock().await.requests(kind).len()
    }
}

impl EntityStore for InMemoryEntityStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let work = guard.clone();
        Ok(InMemoryTransaction {
            guard,
            work,
            fail_counter_adjustments: self.fail_counter_adjustments.load(Ordering::SeqCst),
        })
    }
}

/// Transaction over [`InMemoryEntityStore`].
///
/// Holds the store mutex until committed or dropped.
#[derive(Debug)]
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
    fail_counter_adjustments: bool,
}

impl InMemoryTransaction {
    fn stray_mut(&mut self, id: StrayId) -> Result<&mut StrayAnimal> {
        self.work
            .strays
            .get_mut(&id)
            .ok_or_else(|| DispositionError::internal(format!("stray {id} missing")))
    }
}

impl StoreTransaction for InMemoryTransaction {
    async fn find_stray(&mut self, id: StrayId) -> Result<Option<StrayAnimal>> {
        Ok(self.work.strays.get(&id).cloned())
    }

    async fn lock_stray(&mut self, id: StrayId) -> Result<Option<StrayAnimal>> {
        self.find_stray(id).await
    }

    async fn find_stray_by_tag(&mut self, tag: &HardwareTag) -> Result<Option<StrayAnimal>> {
        Ok(self.work.stray_with_tag(tag).cloned())
    }

    async fn insert_stray(
        &mut self,
        stray: NewStray,
        captured_at: DateTime<Utc>,
    ) -> Result<StrayAnimal> {
        if let Some(tag) = &stray.hardware_tag {
            if let Some(holder) = self.work.stray_with_tag(tag) {
                return Err(DispositionError::conflict(format!(
                    "hardware tag {tag} already belongs to stray {}",
                    holder.id
                )));
            }
        }
        self.work.last_stray += 1;
        let row = StrayAnimal {
            id: StrayId::new(self.work.last_stray),
            species: stray.species,
            breed: stray.breed,
            sex: stray.sex,
            markings: stray.markings,
            capture_location: stray.capture_location,
            hardware_tag: stray.hardware_tag,
            status: StrayStatus::Captured,
            captured_at,
            updated_at: captured_at,
        };
        self.work.strays.insert(row.id, row.clone());
        Ok(row)
    }

    async fn set_stray_status(
        &mut self,
        id: StrayId,
        status: StrayStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let stray = self.stray_mut(id)?;
        stray.status = status;
        stray.updated_at = at;
        Ok(())
    }

    async fn assign_stray_tag(
        &mut self,
        id: StrayId,
        tag: &HardwareTag,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(holder) = self.work.stray_with_tag(tag) {
            if holder.id != id {
                return Err(DispositionError::conflict(format!(
                    "hardware tag {tag} already belongs to stray {}",
                    holder.id
                )));
            }
        }
        let stray = self.stray_mut(id)?;
        stray.hardware_tag = Some(tag.clone());
        stray.updated_at = at;
        Ok(())
    }

    async fn find_owner(&mut self, id: OwnerId) -> Result<Option<Owner>> {
        Ok(self.work.owners.get(&id).cloned())
    }

    async fn insert_owner(&mut self, owner: NewOwner, created_at: DateTime<Utc>) -> Result<Owner> {
        self.work.last_owner += 1;
        let row = Owner {
            id: OwnerId::new(self.work.last_owner),
            full_name: owner.full_name,
            phone: owner.phone,
            email: owner.email,
            address: owner.address,
            pet_count: 0,
            created_at,
        };
        self.work.owners.insert(row.id, row.clone());
        Ok(row)
    }

    async fn adjust_pet_count(&mut self, owner: OwnerId, delta: i32) -> Result<()> {
        if self.fail_counter_adjustments {
            return Err(DispositionError::internal("pet_count update failed"));
        }
        if let Some(row) = self.work.owners.get_mut(&owner) {
            row.pet_count = row.pet_count.saturating_add(delta).max(0);
        }
        Ok(())
    }

    async fn recompute_pet_counts(
        &mut self,
        owner: Option<OwnerId>,
    ) -> Result<Vec<PetCountCorrection>> {
        let mut held: BTreeMap<OwnerId, i32> = BTreeMap::new();
        for pet in self.work.pets.values() {
            *held.entry(pet.owner_id).or_default() += 1;
        }

        let mut corrections = Vec::new();
        for row in self.work.owners.values_mut() {
            if owner.is_some_and(|id| id != row.id) {
                continue;
            }
            let actual = held.get(&row.id).copied().unwrap_or(0);
            if row.pet_count != actual {
                corrections.push(PetCountCorrection {
                    owner_id: row.id,
                    previous: row.pet_count,
                    actual,
                });
                row.pet_count = actual;
            }
        }
        Ok(corrections)
    }

    async fn find_request(
        &mut self,
        kind: RequestKind,
        id: RequestId,
    ) -> Result<Option<DispositionRequest>> {
        Ok(self.work.requests(kind).get(&id).cloned())
    }

    async fn lock_request(
        &mut self,
        kind: RequestKind,
        id: RequestId,
    ) -> Result<Option<DispositionRequest>> {
        self.find_request(kind, id).await
    }

    async fn insert_request(
        &mut self,
        request: NewRequest,
        created_at: DateTime<Utc>,
    ) -> Result<DispositionRequest> {
        let kind = request.details.kind();
        let last = match kind {
            RequestKind::Adoption => &mut self.work.last_adoption,
            RequestKind::Redemption => &mut self.work.last_redemption,
        };
        *last += 1;
        let row = DispositionRequest {
            id: RequestId::new(*last),
            stray_id: request.stray_id,
            requester_id: request.requester_id,
            status: RequestStatus::Pending,
            details: request.details,
            created_at,
            updated_at: created_at,
        };
        self.work.requests_mut(kind).insert(row.id, row.clone());
        Ok(row)
    }

    async fn set_request_status(
        &mut self,
        kind: RequestKind,
        id: RequestId,
        status: RequestStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let request = self
            .work
            .requests_mut(kind)
            .get_mut(&id)
            .ok_or_else(|| DispositionError::internal(format!("{kind} request {id} missing")))?;
        request.status = status;
        request.updated_at = at;
        Ok(())
    }

    async fn reject_pending_adoptions(
        &mut self,
        stray: StrayId,
        keep: RequestId,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut rejected = 0;
        for request in self.work.adoptions.values_mut() {
            if request.stray_id == stray
                && request.id != keep
                && request.status == RequestStatus::Pending
            {
                request.status = RequestStatus::Rejected;
                request.updated_at = at;
                rejected += 1;
            }
        }
        Ok(rejected)
    }

    async fn reject_open_requests(
        &mut self,
        kind: RequestKind,
        stray: StrayId,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut rejected = 0;
        for request in self.work.requests_mut(kind).values_mut() {
            if request.stray_id == stray && request.status.is_open() {
                request.status = RequestStatus::Rejected;
                request.updated_at = at;
                rejected += 1;
            }
        }
        Ok(rejected)
    }

    async fn delete_redemptions(&mut self, stray: StrayId) -> Result<u64> {
        let before = self.work.redemptions.len();
        self.work.redemptions.retain(|_, request| {
            request.stray_id != stray || request.status == RequestStatus::Archived
        });
        Ok(u64::try_from(before - self.work.redemptions.len()).unwrap_or(u64::MAX))
    }

    async fn list_requests(&mut self, filter: RequestFilter) -> Result<Vec<RequestListing>> {
        let mut listings: Vec<RequestListing> = self
            .work
            .requests(filter.kind)
            .values()
            .filter(|request| filter.requester_id.is_none_or(|id| id == request.requester_id))
            .filter(|request| filter.status.is_none_or(|status| status == request.status))
            .filter_map(|request| {
                let stray = self.work.strays.get(&request.stray_id)?;
                let owner = self.work.owners.get(&request.requester_id)?;
                if filter.kind == RequestKind::Redemption && stray.status.excludes_redemption() {
                    return None;
                }
                Some(RequestListing {
                    request: request.clone(),
                    stray_species: stray.species.clone(),
                    stray_status: stray.status,
                    stray_tag: stray.hardware_tag.clone(),
                    requester_name: owner.full_name.clone(),
                    requester_phone: owner.phone.clone(),
                })
            })
            .collect();
        listings.sort_by(|a, b| {
            b.request
                .created_at
                .cmp(&a.request.created_at)
                .then(b.request.id.cmp(&a.request.id))
        });
        Ok(listings)
    }

    async fn find_pets_by_tag(&mut self, tag: &HardwareTag) -> Result<Vec<Pet>> {
        Ok(self.work.pets_with_tag(tag))
    }

    async fn lock_pets_by_tag(&mut self, tag: &HardwareTag) -> Result<Vec<Pet>> {
        Ok(self.work.pets_with_tag(tag))
    }

    async fn insert_pet(&mut self, pet: NewPet, at: DateTime<Utc>) -> Result<Pet> {
        self.work.last_pet += 1;
        let row = Pet {
            id: PetId::new(self.work.last_pet),
            owner_id: pet.owner_id,
            hardware_tag: pet.hardware_tag,
            description: pet.description,
            status: pet.status,
            capture_count: 0,
            created_at: at,
            updated_at: at,
        };
        self.work.pets.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_pet(&mut self, pet: &Pet) -> Result<()> {
        let row = self
            .work
            .pets
            .get_mut(&pet.id)
            .ok_or_else(|| DispositionError::internal(format!("pet {} missing", pet.id)))?;
        row.owner_id = pet.owner_id;
        row.hardware_tag.clone_from(&pet.hardware_tag);
        row.description = pet.description.clone();
        row.status = pet.status;
        row.updated_at = pet.updated_at;
        Ok(())
    }

    async fn delete_pets(&mut self, ids: &[PetId]) -> Result<u64> {
        let mut deleted = 0;
        for id in ids {
            if self.work.pets.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn increment_capture_count(&mut self, id: PetId) -> Result<()> {
        let pet = self
            .work
            .pets
            .get_mut(&id)
            .ok_or_else(|| DispositionError::internal(format!("pet {id} missing")))?;
        pet.capture_count += 1;
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        *self.guard = self.work;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

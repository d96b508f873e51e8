//! Entity store abstraction.
//!
//! The entity store owns the `stray_animal`, `adoption_request`,
//! `redemption_request`, `pet` and `pet_owner` tables. Every service
//! operation runs inside one [`StoreTransaction`] obtained from
//! [`EntityStore::begin`]; nothing is visible to other transactions until
//! [`StoreTransaction::commit`], and dropping a transaction without
//! committing rolls it back.
//!
//! # Locking
//!
//! The `lock_*` methods are blocking locking reads (`SELECT … FOR UPDATE`):
//! a second transaction locking the same rows waits until the first commits
//! or rolls back and then observes its writes. Callers lock in the order
//! stray → request → pets, and a transaction that writes request rows holds
//! the lock on their stray first. The plain `find_*` reads take no locks.
//!
//! # Implementations
//!
//! - `PostgresEntityStore` (in `animal-control-postgres`): production
//! - `InMemoryEntityStore` (in `animal-control-testing`): serialises whole
//!   transactions, fast and deterministic for tests

use crate::error::Result;
use crate::lifecycle::{RequestStatus, StrayStatus};
use crate::types::{
    DispositionRequest, HardwareTag, NewOwner, NewPet, NewRequest, NewStray, Owner, OwnerId, Pet,
    PetCountCorrection, PetId, RequestFilter, RequestId, RequestKind, RequestListing, StrayAnimal,
    StrayId,
};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Source of transactions over the entity tables.
pub trait EntityStore: Send + Sync {
    /// Transaction handle.
    type Transaction: StoreTransaction;

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if no connection is available.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction>> + Send;
}

/// One unit of work against the entity tables.
///
/// All methods return `Internal` on storage failure; that is the only error
/// they produce unless stated otherwise.
pub trait StoreTransaction: Send {
    // ═══════════════════════════════════════════════════════════════════════
    // Stray animals
    // ═══════════════════════════════════════════════════════════════════════

    /// Read a stray without locking it.
    fn find_stray(&mut self, id: StrayId)
    -> impl Future<Output = Result<Option<StrayAnimal>>> + Send;

    /// Read and lock a stray row.
    fn lock_stray(&mut self, id: StrayId)
    -> impl Future<Output = Result<Option<StrayAnimal>>> + Send;

    /// The stray currently carrying `tag`, if any.
    fn find_stray_by_tag(
        &mut self,
        tag: &HardwareTag,
    ) -> impl Future<Output = Result<Option<StrayAnimal>>> + Send;

    /// Insert a stray in `captured`.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the tag already belongs to another stray.
    fn insert_stray(
        &mut self,
        stray: NewStray,
        captured_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<StrayAnimal>> + Send;

    /// Overwrite a stray's status.
    fn set_stray_status(
        &mut self,
        id: StrayId,
        status: StrayStatus,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Persist a tag onto a stray that has none.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the tag already belongs to another stray.
    fn assign_stray_tag(
        &mut self,
        id: StrayId,
        tag: &HardwareTag,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    // ═══════════════════════════════════════════════════════════════════════
    // Owners
    // ═══════════════════════════════════════════════════════════════════════

    /// Read an owner.
    fn find_owner(&mut self, id: OwnerId) -> impl Future<Output = Result<Option<Owner>>> + Send;

    /// Insert an owner with `pet_count = 0`.
    fn insert_owner(
        &mut self,
        owner: NewOwner,
        created_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Owner>> + Send;

    /// Add `delta` to an owner's counter, clamping at zero.
    ///
    /// Best-effort bookkeeping: a failure must leave the surrounding
    /// transaction usable so the caller can log it and carry on.
    fn adjust_pet_count(
        &mut self,
        owner: OwnerId,
        delta: i32,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Set counters to the number of pet rows actually owned, for one owner
    /// or every owner, returning the counters that had drifted.
    fn recompute_pet_counts(
        &mut self,
        owner: Option<OwnerId>,
    ) -> impl Future<Output = Result<Vec<PetCountCorrection>>> + Send;

    // ═══════════════════════════════════════════════════════════════════════
    // Requests
    // ═══════════════════════════════════════════════════════════════════════

    /// Read a request without locking it.
    fn find_request(
        &mut self,
        kind: RequestKind,
        id: RequestId,
    ) -> impl Future<Output = Result<Option<DispositionRequest>>> + Send;

    /// Read and lock a request row.
    fn lock_request(
        &mut self,
        kind: RequestKind,
        id: RequestId,
    ) -> impl Future<Output = Result<Option<DispositionRequest>>> + Send;

    /// Insert a `pending` request into the table for its kind.
    fn insert_request(
        &mut self,
        request: NewRequest,
        created_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<DispositionRequest>> + Send;

    /// Overwrite a request's status.
    fn set_request_status(
        &mut self,
        kind: RequestKind,
        id: RequestId,
        status: RequestStatus,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Reject every `pending` adoption request for `stray` except `keep`.
    /// Returns how many were rejected.
    fn reject_pending_adoptions(
        &mut self,
        stray: StrayId,
        keep: RequestId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Reject every open (`pending`/`approved`) request of `kind` for `stray`.
    fn reject_open_requests(
        &mut self,
        kind: RequestKind,
        stray: StrayId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Delete every non-archived redemption request for `stray`.
    fn delete_redemptions(&mut self, stray: StrayId) -> impl Future<Output = Result<u64>> + Send;

    /// Requests joined with stray and requester display data, newest first.
    ///
    /// Redemption listings exclude requests whose stray is in `adoption` or
    /// `adopted`.
    fn list_requests(
        &mut self,
        filter: RequestFilter,
    ) -> impl Future<Output = Result<Vec<RequestListing>>> + Send;

    // ═══════════════════════════════════════════════════════════════════════
    // Pets
    // ═══════════════════════════════════════════════════════════════════════

    /// Pet rows carrying `tag`, ordered by id, without locking.
    fn find_pets_by_tag(
        &mut self,
        tag: &HardwareTag,
    ) -> impl Future<Output = Result<Vec<Pet>>> + Send;

    /// Lock and return every pet row carrying `tag`, ordered by id.
    fn lock_pets_by_tag(
        &mut self,
        tag: &HardwareTag,
    ) -> impl Future<Output = Result<Vec<Pet>>> + Send;

    /// Insert a pet row.
    fn insert_pet(
        &mut self,
        pet: NewPet,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Pet>> + Send;

    /// Write owner, tag, description, status and `updated_at` of a pet row.
    fn update_pet(&mut self, pet: &Pet) -> impl Future<Output = Result<()>> + Send;

    /// Delete pet rows; returns how many existed.
    fn delete_pets(&mut self, ids: &[PetId]) -> impl Future<Output = Result<u64>> + Send;

    /// Bump the manual-capture counter of a pet row.
    fn increment_capture_count(&mut self, id: PetId) -> impl Future<Output = Result<()>> + Send;

    // ═══════════════════════════════════════════════════════════════════════
    // Completion
    // ═══════════════════════════════════════════════════════════════════════

    /// Make every write visible and release all locks.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;

    /// Discard every write and release all locks.
    fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}

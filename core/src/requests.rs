//! Request lifecycle service: submit, read, list and review adoption and
//! redemption requests.

use crate::environment::Clock;
use crate::error::{DispositionError, Result};
use crate::lifecycle::{RequestStatus, StrayStatus, guard_submission};
use crate::ownership::{ReconcileMode, reconcile_ownership};
use crate::store::{EntityStore, StoreTransaction};
use crate::types::{
    DispositionRequest, NewRequest, OwnerId, RequestDetails, RequestFilter, RequestId, RequestKind,
    RequestListing, StrayAnimal, StrayId,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Submits and reviews disposition requests.
pub struct RequestLifecycleService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for RequestLifecycleService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: EntityStore> RequestLifecycleService<S> {
    /// Create a service over `store`.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Submit a new `pending` request.
    ///
    /// The request kind comes from `details`.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `details` fail validation
    /// - `NotFound` if the stray or the requester does not exist
    /// - `Conflict` if the stray's status does not admit this kind of request
    #[tracing::instrument(skip(self, details), fields(kind = %details.kind()))]
    pub async fn submit(
        &self,
        stray_id: StrayId,
        requester_id: OwnerId,
        details: RequestDetails,
    ) -> Result<DispositionRequest> {
        let details = details.validate()?;
        let kind = details.kind();

        let mut tx = self.store.begin().await?;
        let stray = tx
            .find_stray(stray_id)
            .await?
            .ok_or_else(|| DispositionError::not_found("stray", stray_id))?;
        if tx.find_owner(requester_id).await?.is_none() {
            return Err(DispositionError::not_found("owner", requester_id));
        }
        guard_submission(kind, &stray)?;

        let request = tx
            .insert_request(
                NewRequest {
                    stray_id,
                    requester_id,
                    details,
                },
                self.clock.now(),
            )
            .await?;
        tx.commit().await?;

        metrics::counter!("disposition.requests.submitted", "kind" => kind.as_str()).increment(1);
        tracing::info!(
            request_id = %request.id,
            stray_id = %stray_id,
            requester_id = %requester_id,
            "request submitted"
        );
        Ok(request)
    }

    /// Read one request.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it does not exist.
    pub async fn get(&self, kind: RequestKind, id: RequestId) -> Result<DispositionRequest> {
        let mut tx = self.store.begin().await?;
        let request = tx
            .find_request(kind, id)
            .await?
            .ok_or_else(|| DispositionError::not_found(kind.entity_name(), id))?;
        tx.commit().await?;
        Ok(request)
    }

    /// List requests with stray and requester display data.
    ///
    /// Redemption listings never include requests for animals that are in the
    /// adoption workflow.
    ///
    /// # Errors
    ///
    /// Returns `Internal` on storage failure.
    pub async fn list(&self, filter: RequestFilter) -> Result<Vec<RequestListing>> {
        let mut tx = self.store.begin().await?;
        let listings = tx.list_requests(filter).await?;
        tx.commit().await?;
        Ok(listings)
    }

    /// Review a request: approve or reject it.
    ///
    /// Runs in one transaction holding locks on the stray and then the
    /// request. Approving an adoption also moves the stray to `adopted`,
    /// hands an already-tagged animal to the adopter, rejects the competing
    /// pending adoptions and removes redemption requests for the animal.
    /// Approving a redemption changes only the request; the animal moves when
    /// it is claimed.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the request (or its stray) does not exist
    /// - `Conflict` if the move is illegal, `archived` was asked for, the
    ///   stray is no longer in a state where the approval makes sense, or a
    ///   concurrent transaction removed the request
    #[tracing::instrument(skip(self))]
    pub async fn set_status(
        &self,
        kind: RequestKind,
        id: RequestId,
        status: RequestStatus,
    ) -> Result<DispositionRequest> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let (request, stray) = lock_with_stray(&mut tx, kind, id).await?;
        let next = request.status.review(status)?;

        if next == RequestStatus::Approved {
            match kind {
                RequestKind::Adoption => {
                    Self::approve_adoption(&mut tx, &request, &stray, now).await?;
                }
                RequestKind::Redemption => check_redeemable(&stray)?,
            }
        }

        tx.set_request_status(kind, id, next, now).await?;
        tx.commit().await?;

        tracing::info!(request_id = %id, from = %request.status, to = %next, "request reviewed");
        Ok(DispositionRequest {
            status: next,
            updated_at: now,
            ..request
        })
    }

    async fn approve_adoption(
        tx: &mut S::Transaction,
        request: &DispositionRequest,
        stray: &StrayAnimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !stray.status.accepts_adoption_requests() {
            return Err(DispositionError::conflict(format!(
                "stray {} is {}, only animals listed for adoption can be adopted",
                stray.id, stray.status
            )));
        }
        let adopted = stray.status.transition(StrayStatus::Adopted)?;
        tx.set_stray_status(stray.id, adopted, now).await?;

        if let Some(tag) = &stray.hardware_tag {
            reconcile_ownership(
                tx,
                stray,
                tag,
                request.requester_id,
                ReconcileMode::TransferOnly,
                now,
            )
            .await?;
        }

        let rejected = tx.reject_pending_adoptions(stray.id, request.id, now).await?;
        let removed = tx.delete_redemptions(stray.id).await?;
        tracing::info!(
            stray_id = %stray.id,
            adopter_id = %request.requester_id,
            rejected_siblings = rejected,
            removed_redemptions = removed,
            "adoption approved"
        );
        Ok(())
    }
}

fn check_redeemable(stray: &StrayAnimal) -> Result<()> {
    if stray.status.accepts_redemption_requests() {
        Ok(())
    } else {
        Err(DispositionError::conflict(format!(
            "stray {} is {}, it cannot be redeemed",
            stray.id, stray.status
        )))
    }
}

/// Lock a request together with its stray, stray row first.
///
/// Every transaction that writes request rows takes the stray lock before
/// any request lock. The request is re-read under its lock, so the caller
/// sees whatever the transaction it waited on committed.
///
/// # Errors
///
/// - `NotFound` if the request or its stray does not exist
/// - `Conflict` if the request disappeared while waiting for the stray lock
pub(crate) async fn lock_with_stray<T: StoreTransaction>(
    tx: &mut T,
    kind: RequestKind,
    id: RequestId,
) -> Result<(DispositionRequest, StrayAnimal)> {
    let unlocked = tx
        .find_request(kind, id)
        .await?
        .ok_or_else(|| DispositionError::not_found(kind.entity_name(), id))?;
    let stray = tx
        .lock_stray(unlocked.stray_id)
        .await?
        .ok_or_else(|| DispositionError::not_found("stray", unlocked.stray_id))?;
    let request = tx.lock_request(kind, id).await?.ok_or_else(|| {
        DispositionError::conflict(format!(
            "{} {id} was removed by a concurrent change to stray {}",
            kind.entity_name(),
            stray.id
        ))
    })?;
    Ok((request, stray))
}

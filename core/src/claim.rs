//! Claim: the handover that turns an approved request into a `pet` row.
//!
//! A claim runs as one transaction:
//!
//! 1. lock the stray, then the request; require `approved`
//! 2. require a legal move of the stray to `claimed`
//! 3. resolve the tag (caller's value, else the stray's)
//! 4. persist the tag on an untagged stray
//! 5. reconcile ownership so exactly one pet row carries the tag
//! 6. archive the request, reject the other open requests for the stray and
//!    mark the stray `claimed`
//! 7. bump the manual-capture counter for hand-entered tags
//!
//! Two claims racing on the same stray serialise on the stray lock; the
//! second one sees `archived` (or a `claimed` stray) and fails with
//! `Conflict`.

use crate::environment::Clock;
use crate::error::{DispositionError, Result};
use crate::lifecycle::{RequestStatus, StrayStatus};
use crate::ownership::{ReconcileMode, reconcile_ownership};
use crate::requests::lock_with_stray;
use crate::store::{EntityStore, StoreTransaction};
use crate::types::{ClaimCommand, ClaimReceipt, HardwareTag, RequestKind, StrayAnimal};
use std::sync::Arc;

/// Materialises approved requests into permanent ownership records.
pub struct ClaimService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for ClaimService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: EntityStore> ClaimService<S> {
    /// Create a service over `store`.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Claim an approved request.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the request or its stray does not exist
    /// - `Conflict` if the request is not `approved`, the stray cannot be
    ///   claimed, the supplied tag disagrees with the stray's tag, or the tag
    ///   belongs to another stray
    /// - `InvalidArgument` if no tag was supplied and the stray has none
    /// - `Internal` on storage failure
    ///
    /// Nothing is written when an error is returned.
    #[tracing::instrument(skip(self), fields(kind = %command.kind, request_id = %command.request_id))]
    pub async fn claim(&self, command: ClaimCommand) -> Result<ClaimReceipt> {
        let result = self.claim_in_transaction(&command).await;
        match &result {
            Ok(receipt) => {
                metrics::counter!("disposition.claims.completed").increment(1);
                tracing::info!(
                    pet_id = %receipt.pet_id,
                    owner_id = %receipt.owner_id,
                    tag = %receipt.hardware_tag,
                    transferred_from = ?receipt.transferred_from,
                    removed_duplicates = receipt.removed_duplicates,
                    closed_requests = receipt.closed_requests,
                    "claim completed"
                );
                if receipt.failed_counter_updates > 0 {
                    tracing::warn!(
                        failed = receipt.failed_counter_updates,
                        "claim left pet counters stale, run a recompute"
                    );
                }
            }
            Err(DispositionError::Conflict(reason)) => {
                metrics::counter!("disposition.claims.conflicts").increment(1);
                tracing::info!(%reason, "claim refused");
            }
            Err(error) => tracing::warn!(%error, "claim failed"),
        }
        result
    }

    async fn claim_in_transaction(&self, command: &ClaimCommand) -> Result<ClaimReceipt> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let (request, stray) = lock_with_stray(&mut tx, command.kind, command.request_id).await?;
        if request.status != RequestStatus::Approved {
            return Err(DispositionError::conflict(format!(
                "{} {} is {}, only approved requests can be claimed",
                command.kind.entity_name(),
                request.id,
                request.status
            )));
        }

        let claimed = stray.status.transition(StrayStatus::Claimed)?;

        let tag = resolve_tag(command.hardware_tag.as_ref(), &stray)?;
        if stray.hardware_tag.is_none() {
            if let Some(holder) = tx.find_stray_by_tag(&tag).await? {
                return Err(DispositionError::conflict(format!(
                    "hardware tag {tag} already belongs to stray {}",
                    holder.id
                )));
            }
            tx.assign_stray_tag(stray.id, &tag, now).await?;
        }

        let outcome = reconcile_ownership(
            &mut tx,
            &stray,
            &tag,
            request.requester_id,
            ReconcileMode::Materialize,
            now,
        )
        .await?;
        let pet_id = outcome
            .pet_id
            .ok_or_else(|| DispositionError::internal(format!("claim left no pet row for {tag}")))?;

        tx.set_request_status(command.kind, request.id, RequestStatus::Archived, now)
            .await?;
        let mut closed = 0;
        for kind in [RequestKind::Adoption, RequestKind::Redemption] {
            closed += tx.reject_open_requests(kind, stray.id, now).await?;
        }
        tx.set_stray_status(stray.id, claimed, now).await?;

        if command.manual_entry {
            tx.increment_capture_count(pet_id).await?;
        }

        tx.commit().await?;

        Ok(ClaimReceipt {
            pet_id,
            hardware_tag: tag,
            owner_id: request.requester_id,
            transferred_from: outcome.transferred_from,
            removed_duplicates: outcome.removed_duplicates,
            closed_requests: closed,
            failed_counter_updates: outcome.failed_adjustments,
        })
    }
}

/// Caller-supplied tag, else the stray's own.
fn resolve_tag(supplied: Option<&HardwareTag>, stray: &StrayAnimal) -> Result<HardwareTag> {
    match (supplied, stray.hardware_tag.as_ref()) {
        (Some(given), Some(existing)) if given != existing => {
            Err(DispositionError::conflict(format!(
                "stray {} already carries hardware tag {existing}",
                stray.id
            )))
        }
        (Some(tag), _) | (None, Some(tag)) => Ok(tag.clone()),
        (None, None) => Err(DispositionError::invalid(format!(
            "stray {} has no hardware tag and none was supplied",
            stray.id
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::StrayId;
    use chrono::{TimeZone, Utc};

    fn stray(tag: Option<&str>) -> StrayAnimal {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        StrayAnimal {
            id: StrayId::new(7),
            species: "dog".into(),
            breed: None,
            sex: None,
            markings: None,
            capture_location: None,
            hardware_tag: tag.map(|t| HardwareTag::parse(t).unwrap()),
            status: StrayStatus::Adopted,
            captured_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn supplied_tag_wins_on_untagged_stray() {
        let tag = HardwareTag::parse("RF100").unwrap();
        assert_eq!(resolve_tag(Some(&tag), &stray(None)), Ok(tag));
    }

    #[test]
    fn stray_tag_used_when_none_supplied() {
        let resolved = resolve_tag(None, &stray(Some("RF100"))).unwrap();
        assert_eq!(resolved.as_str(), "RF100");
    }

    #[test]
    fn matching_tags_are_accepted() {
        let tag = HardwareTag::parse("RF100").unwrap();
        assert_eq!(resolve_tag(Some(&tag), &stray(Some("RF100"))), Ok(tag));
    }

    #[test]
    fn disagreeing_tags_conflict() {
        let tag = HardwareTag::parse("RF200").unwrap();
        assert!(matches!(
            resolve_tag(Some(&tag), &stray(Some("RF100"))),
            Err(DispositionError::Conflict(_))
        ));
    }

    #[test]
    fn missing_tag_is_invalid() {
        assert!(matches!(
            resolve_tag(None, &stray(None)),
            Err(DispositionError::InvalidArgument(_))
        ));
    }
}

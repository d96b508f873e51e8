//! Ownership reconciliation for a hardware tag.
//!
//! Legacy data may hold several `pet` rows for one tag, spread across
//! owners. Reconciling ownership collapses them into exactly one row owned
//! by the new owner and computes the counter adjustments that go with it.
//!
//! The decision is a pure function, [`plan_ownership`], so the invariants
//! (one row per tag, counter deltas matching the row delta) can be checked
//! without a database. [`reconcile_ownership`] executes a plan inside an
//! open transaction; approval-time and claim-time transfers both go through
//! it.

use crate::error::{DispositionError, Result};
use crate::lifecycle::StrayStatus;
use crate::store::StoreTransaction;
use crate::types::{HardwareTag, NewPet, OwnerId, Pet, PetDescription, PetId, PetStatus, StrayAnimal};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// How far reconciliation may go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Move existing rows only; never create a pet identity. Used when an
    /// adoption is approved.
    TransferOnly,
    /// Insert a row when nobody holds the tag. Used by claims.
    Materialize,
}

/// What happens to the surviving row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurvivorAction {
    /// A row held by someone else is reassigned to the new owner.
    Transfer {
        /// Row being reassigned
        pet_id: PetId,
        /// Its previous owner
        from: OwnerId,
    },
    /// The new owner already holds a row; it is refreshed in place.
    Keep {
        /// Row kept
        pet_id: PetId,
    },
    /// No row exists; one is inserted.
    Insert,
    /// No row exists and inserting is not allowed.
    Untouched,
}

/// Mutations required to give `new_owner` the single row for a tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnershipPlan {
    /// Surviving row
    pub survivor: SurvivorAction,
    /// Rows to delete
    pub delete: Vec<PetId>,
    /// Non-zero counter adjustments per owner
    pub counter_deltas: BTreeMap<OwnerId, i32>,
}

impl OwnershipPlan {
    /// Rows added minus rows removed for the tag.
    #[must_use]
    pub fn net_row_change(&self) -> i64 {
        let inserted = i64::from(matches!(self.survivor, SurvivorAction::Insert));
        inserted - i64::try_from(self.delete.len()).unwrap_or(i64::MAX)
    }

    /// Sum of all counter adjustments.
    #[must_use]
    pub fn delta_sum(&self) -> i64 {
        self.counter_deltas.values().map(|d| i64::from(*d)).sum()
    }

    /// Whether executing the plan changes nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.delete.is_empty()
            && self.counter_deltas.is_empty()
            && matches!(self.survivor, SurvivorAction::Untouched)
    }
}

/// Decide how `pets` (all rows carrying one tag) become one row owned by
/// `new_owner`.
///
/// Rows owned by someone else are transfer candidates; the lowest-id one is
/// reassigned and every other row is deleted, including duplicates the new
/// owner already held. Without a candidate the new owner's lowest-id row is
/// kept and its duplicates deleted. Counter deltas are `1 − held` for the new
/// owner and `−held` for every dispossessed owner.
#[must_use]
pub fn plan_ownership(pets: &[Pet], new_owner: OwnerId, mode: ReconcileMode) -> OwnershipPlan {
    let mut sorted: Vec<&Pet> = pets.iter().collect();
    sorted.sort_by_key(|pet| pet.id);

    let candidate = sorted.iter().find(|pet| pet.owner_id != new_owner);
    let keeper = sorted.iter().find(|pet| pet.owner_id == new_owner);

    let (survivor, survivor_id) = match (candidate, keeper) {
        (Some(pet), _) => (
            SurvivorAction::Transfer {
                pet_id: pet.id,
                from: pet.owner_id,
            },
            pet.id,
        ),
        (None, Some(pet)) => (SurvivorAction::Keep { pet_id: pet.id }, pet.id),
        (None, None) => {
            return match mode {
                ReconcileMode::Materialize => OwnershipPlan {
                    survivor: SurvivorAction::Insert,
                    delete: Vec::new(),
                    counter_deltas: BTreeMap::from([(new_owner, 1)]),
                },
                ReconcileMode::TransferOnly => OwnershipPlan {
                    survivor: SurvivorAction::Untouched,
                    delete: Vec::new(),
                    counter_deltas: BTreeMap::new(),
                },
            };
        }
    };

    let delete = sorted
        .iter()
        .map(|pet| pet.id)
        .filter(|id| *id != survivor_id)
        .collect();

    let mut held: BTreeMap<OwnerId, i32> = BTreeMap::new();
    for pet in &sorted {
        *held.entry(pet.owner_id).or_default() += 1;
    }
    let mut counter_deltas = BTreeMap::new();
    let requester_held = held.remove(&new_owner).unwrap_or(0);
    counter_deltas.insert(new_owner, 1 - requester_held);
    for (owner, count) in held {
        counter_deltas.insert(owner, -count);
    }
    counter_deltas.retain(|_, delta| *delta != 0);

    OwnershipPlan {
        survivor,
        delete,
        counter_deltas,
    }
}

/// What a reconciliation did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// The row now owned by the new owner, if any
    pub pet_id: Option<PetId>,
    /// Previous holder of a transferred row
    pub transferred_from: Option<OwnerId>,
    /// Duplicate rows deleted
    pub removed_duplicates: usize,
    /// Counter adjustments that could not be written
    pub failed_adjustments: usize,
}

/// Give `new_owner` the single pet row for `tag`, inside `tx`.
///
/// Idempotent: once the tag has one row owned by `new_owner`, running again
/// deletes nothing and adjusts no counter. Does nothing for a stray that is
/// already `claimed`, so an approval-time transfer never repeats a claim.
///
/// Counter adjustments are best-effort; failures are logged and counted in
/// the outcome but do not fail the call.
///
/// # Errors
///
/// Returns `Internal` if locking, writing or deleting pet rows fails.
pub async fn reconcile_ownership<T: StoreTransaction>(
    tx: &mut T,
    stray: &StrayAnimal,
    tag: &HardwareTag,
    new_owner: OwnerId,
    mode: ReconcileMode,
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome> {
    if stray.status == StrayStatus::Claimed {
        tracing::debug!(stray_id = %stray.id, %tag, "stray already claimed, ownership left as is");
        return Ok(ReconcileOutcome::default());
    }

    let pets = tx.lock_pets_by_tag(tag).await?;
    let plan = plan_ownership(&pets, new_owner, mode);
    let description = PetDescription::from_stray(stray);

    let mut outcome = ReconcileOutcome {
        removed_duplicates: plan.delete.len(),
        ..ReconcileOutcome::default()
    };

    if !plan.delete.is_empty() {
        tx.delete_pets(&plan.delete).await?;
    }

    match plan.survivor {
        SurvivorAction::Transfer { pet_id, .. } | SurvivorAction::Keep { pet_id } => {
            let mut pet = pets
                .iter()
                .find(|pet| pet.id == pet_id)
                .cloned()
                .ok_or_else(|| DispositionError::internal(format!("pet {pet_id} vanished")))?;
            pet.owner_id = new_owner;
            pet.status = PetStatus::Owned;
            pet.description = pet.description.coalesce(description);
            pet.updated_at = now;
            tx.update_pet(&pet).await?;
            outcome.pet_id = Some(pet_id);
            if let SurvivorAction::Transfer { from, .. } = plan.survivor {
                outcome.transferred_from = Some(from);
            }
        }
        SurvivorAction::Insert => {
            let pet = tx
                .insert_pet(
                    NewPet {
                        owner_id: new_owner,
                        hardware_tag: Some(tag.clone()),
                        description,
                        status: PetStatus::Owned,
                    },
                    now,
                )
                .await?;
            outcome.pet_id = Some(pet.id);
        }
        SurvivorAction::Untouched => {}
    }

    for (owner, delta) in &plan.counter_deltas {
        if let Err(error) = tx.adjust_pet_count(*owner, *delta).await {
            tracing::warn!(
                owner_id = %owner,
                delta = delta,
                %tag,
                error = %error,
                "pet_count adjustment failed, leaving it for recompute"
            );
            metrics::counter!("disposition.pet_count.adjust_failed").increment(1);
            outcome.failed_adjustments += 1;
        }
    }

    if outcome.transferred_from.is_some() || outcome.removed_duplicates > 0 {
        tracing::info!(
            %tag,
            new_owner = %new_owner,
            transferred_from = ?outcome.transferred_from,
            removed = outcome.removed_duplicates,
            "ownership reconciled"
        );
    }

    Ok(outcome)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn pet(id: i64, owner: i64) -> Pet {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Pet {
            id: PetId::new(id),
            owner_id: OwnerId::new(owner),
            hardware_tag: Some(HardwareTag::parse("RF100").unwrap()),
            description: PetDescription::default(),
            status: PetStatus::Owned,
            capture_count: 0,
            created_at: at,
            updated_at: at,
        }
    }

    const A: OwnerId = OwnerId::new(1);
    const B: OwnerId = OwnerId::new(2);

    #[test]
    fn transfer_from_single_foreign_owner() {
        let plan = plan_ownership(&[pet(1, 1)], B, ReconcileMode::Materialize);
        assert_eq!(
            plan.survivor,
            SurvivorAction::Transfer {
                pet_id: PetId::new(1),
                from: A
            }
        );
        assert!(plan.delete.is_empty());
        assert_eq!(plan.counter_deltas, BTreeMap::from([(A, -1), (B, 1)]));
    }

    #[test]
    fn transfer_deletes_requesters_own_duplicates() {
        let pets = [pet(5, 2), pet(3, 1), pet(8, 2)];
        let plan = plan_ownership(&pets, B, ReconcileMode::Materialize);
        assert_eq!(
            plan.survivor,
            SurvivorAction::Transfer {
                pet_id: PetId::new(3),
                from: A
            }
        );
        assert_eq!(plan.delete, vec![PetId::new(5), PetId::new(8)]);
        // B held 2 and ends with 1, A held 1 and ends with 0.
        assert_eq!(plan.counter_deltas, BTreeMap::from([(A, -1), (B, -1)]));
    }

    #[test]
    fn keeper_is_lowest_id_and_duplicates_go() {
        let pets = [pet(9, 2), pet(4, 2)];
        let plan = plan_ownership(&pets, B, ReconcileMode::Materialize);
        assert_eq!(plan.survivor, SurvivorAction::Keep { pet_id: PetId::new(4) });
        assert_eq!(plan.delete, vec![PetId::new(9)]);
        assert_eq!(plan.counter_deltas, BTreeMap::from([(B, -1)]));
    }

    #[test]
    fn empty_tag_inserts_only_when_materializing() {
        let plan = plan_ownership(&[], B, ReconcileMode::Materialize);
        assert_eq!(plan.survivor, SurvivorAction::Insert);
        assert_eq!(plan.counter_deltas, BTreeMap::from([(B, 1)]));

        let plan = plan_ownership(&[], B, ReconcileMode::TransferOnly);
        assert!(plan.is_noop());
    }

    #[test]
    fn already_reconciled_is_noop_apart_from_keep() {
        let plan = plan_ownership(&[pet(1, 2)], B, ReconcileMode::Materialize);
        assert_eq!(plan.survivor, SurvivorAction::Keep { pet_id: PetId::new(1) });
        assert!(plan.delete.is_empty());
        assert!(plan.counter_deltas.is_empty());
    }

    fn arb_pets() -> impl Strategy<Value = Vec<Pet>> {
        prop::collection::vec(1i64..5, 0..8).prop_map(|owners| {
            owners
                .into_iter()
                .enumerate()
                .map(|(i, owner)| pet(i64::try_from(i).unwrap() + 1, owner))
                .collect()
        })
    }

    fn arb_mode() -> impl Strategy<Value = ReconcileMode> {
        prop_oneof![
            Just(ReconcileMode::TransferOnly),
            Just(ReconcileMode::Materialize)
        ]
    }

    proptest! {
        #[test]
        fn at_most_one_row_survives(pets in arb_pets(), owner in 1i64..5, mode in arb_mode()) {
            let plan = plan_ownership(&pets, OwnerId::new(owner), mode);
            let remaining = i64::try_from(pets.len()).unwrap() + plan.net_row_change();
            prop_assert!(remaining <= 1);
            if mode == ReconcileMode::Materialize {
                prop_assert_eq!(remaining, 1);
            }
        }

        #[test]
        fn counter_deltas_match_row_change(pets in arb_pets(), owner in 1i64..5, mode in arb_mode()) {
            let plan = plan_ownership(&pets, OwnerId::new(owner), mode);
            prop_assert_eq!(plan.delta_sum(), plan.net_row_change());
        }

        #[test]
        fn planning_twice_settles(pets in arb_pets(), owner in 1i64..5) {
            let owner = OwnerId::new(owner);
            let plan = plan_ownership(&pets, owner, ReconcileMode::Materialize);
            let survivor = match plan.survivor {
                SurvivorAction::Transfer { pet_id, .. } | SurvivorAction::Keep { pet_id } => pet_id.get(),
                SurvivorAction::Insert => 100,
                SurvivorAction::Untouched => unreachable!("materialize always leaves a row"),
            };
            let second = plan_ownership(&[pet(survivor, owner.get())], owner, ReconcileMode::Materialize);
            prop_assert!(second.delete.is_empty());
            prop_assert!(second.counter_deltas.is_empty());
        }
    }
}

//! Property tests driving the services through random operation sequences.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use animal_control_core::{RequestKind, RequestStatus, StrayStatus};
use animal_control_testing::properties::{arb_request_status, arb_status_walk};
use animal_control_testing::{Harness, InMemoryEntityStore};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Per tag: the owners holding legacy rows for it, and who claims it.
fn arb_claims() -> impl Strategy<Value = Vec<(Vec<usize>, usize)>> {
    prop::collection::vec((prop::collection::vec(0usize..3, 0..4), 0usize..3), 1..5)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever legacy rows exist for a tag, a claim leaves exactly one, owned
    /// by the claimer, and the incremental counters match the rows.
    #[test]
    fn one_pet_row_per_tag(claims in arb_claims()) {
        runtime().block_on(async {
            let h = Harness::new(InMemoryEntityStore::new());
            let mut owners = Vec::new();
            for name in ["A", "B", "C"] {
                owners.push(h.owner(name).await.unwrap());
            }

            for (i, (legacy, claimer)) in claims.iter().enumerate() {
                let tag = format!("RF{i}");
                for holder in legacy {
                    h.seed_pet(owners[*holder].id, &tag).await.unwrap();
                }
                let stray = h.capture(None).await.unwrap();
                let request = h
                    .approved(RequestKind::Redemption, stray.id, owners[*claimer].id)
                    .await
                    .unwrap();
                h.claim(RequestKind::Redemption, request.id, Some(&tag), false)
                    .await
                    .unwrap();

                let pets = h.pets(&tag).await.unwrap();
                assert_eq!(pets.len(), 1);
                assert_eq!(pets[0].owner_id, owners[*claimer].id);
            }

            let mut total = 0;
            for owner in &owners {
                total += h.pet_count(owner.id).await.unwrap();
            }
            let rows = i32::try_from(h.store.pet_rows().await).unwrap();
            assert_eq!(total, rows);
            assert!(h.owners.recompute_pet_counts(None).await.unwrap().is_empty());
        });
    }

    /// Manual status updates never move a stray backwards and never leave a
    /// terminal status.
    #[test]
    fn stray_status_never_regresses(walk in arb_status_walk()) {
        runtime().block_on(async {
            let h = Harness::new(InMemoryEntityStore::new());
            let stray = h.capture(None).await.unwrap();
            let mut current = stray.status;
            for next in walk {
                match h.strays.update_status(stray.id, next).await {
                    Ok(updated) => {
                        assert!(current.can_transition_to(next));
                        current = updated.status;
                    }
                    Err(_) => {
                        assert_eq!(h.strays.get(stray.id).await.unwrap().status, current);
                    }
                }
            }
            if current == StrayStatus::Euthanized {
                assert!(h.strays.update_status(stray.id, StrayStatus::Observation).await.is_err());
            }
        });
    }

    /// Review never archives and only allows legal moves.
    #[test]
    fn review_never_archives(from in arb_request_status(), to in arb_request_status()) {
        match from.review(to) {
            Ok(next) => {
                prop_assert_ne!(next, RequestStatus::Archived);
                prop_assert!(from.can_transition_to(next));
            }
            Err(err) => prop_assert_eq!(err.code(), "CONFLICT"),
        }
    }
}

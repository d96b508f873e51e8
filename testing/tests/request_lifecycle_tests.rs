//! Request submission, review and stray status tests against the in-memory
//! store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use animal_control_core::{
    ApplicantDetails, Attachments, DispositionError, OwnerId, RequestDetails, RequestFilter,
    RequestKind, RequestStatus, StrayId, StrayStatus,
};
use animal_control_testing::{Harness, InMemoryEntityStore, init_test_tracing};

fn harness() -> Harness<InMemoryEntityStore> {
    init_test_tracing();
    Harness::new(InMemoryEntityStore::new())
}

#[tokio::test]
async fn redemption_for_adoption_stray_conflicts_without_row() {
    let h = harness();
    let owner = h.owner("Ada").await.unwrap();
    let stray = h.stray_in(StrayStatus::Adoption, None).await.unwrap();

    let err = h
        .submit(RequestKind::Redemption, stray.id, owner.id)
        .await
        .unwrap_err();
    assert!(matches!(err, DispositionError::Conflict(_)));
    assert_eq!(h.store.request_rows(RequestKind::Redemption).await, 0);
}

#[tokio::test]
async fn adoption_requires_listed_stray() {
    let h = harness();
    let owner = h.owner("Ada").await.unwrap();
    for status in [StrayStatus::Captured, StrayStatus::Observation, StrayStatus::Euthanized] {
        let stray = h.stray_in(status, None).await.unwrap();
        let err = h
            .submit(RequestKind::Adoption, stray.id, owner.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DispositionError::Conflict(_)), "{status}");
    }
    assert_eq!(h.store.request_rows(RequestKind::Adoption).await, 0);
}

#[tokio::test]
async fn redemption_refused_for_euthanized_stray() {
    let h = harness();
    let owner = h.owner("Ada").await.unwrap();
    let stray = h.stray_in(StrayStatus::Euthanized, None).await.unwrap();
    let err = h
        .submit(RequestKind::Redemption, stray.id, owner.id)
        .await
        .unwrap_err();
    assert!(matches!(err, DispositionError::Conflict(_)));
}

#[tokio::test]
async fn submit_reports_missing_stray_and_requester() {
    let h = harness();
    let owner = h.owner("Ada").await.unwrap();
    let stray = h.capture(None).await.unwrap();

    let err = h
        .submit(RequestKind::Redemption, StrayId::new(99), owner.id)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");

    let err = h
        .submit(RequestKind::Redemption, stray.id, OwnerId::new(99))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn submit_validates_attachments() {
    let h = harness();
    let owner = h.owner("Ada").await.unwrap();
    let stray = h.capture(None).await.unwrap();

    let err = h
        .requests
        .submit(
            stray.id,
            owner.id,
            RequestDetails::Redemption {
                proof: Attachments::Path("   ".into()),
                contact_phone: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispositionError::InvalidArgument(_)));

    let request = h
        .requests
        .submit(
            stray.id,
            owner.id,
            RequestDetails::Redemption {
                proof: Attachments::List(vec!["proof/a.jpg".into(), "proof/b.jpg".into()]),
                contact_phone: Some("555-0199".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.kind(), RequestKind::Redemption);
}

#[tokio::test]
async fn approving_adoption_settles_competing_requests() {
    let h = harness();
    let winner = h.owner("Winner").await.unwrap();
    let other = h.owner("Other").await.unwrap();
    let stray = h.stray_in(StrayStatus::Observation, None).await.unwrap();
    let redemption = h
        .submit(RequestKind::Redemption, stray.id, other.id)
        .await
        .unwrap();
    // Listing for adoption already removes the redemption.
    let stray = h
        .strays
        .update_status(stray.id, StrayStatus::Adoption)
        .await
        .unwrap();
    assert!(h.requests.get(RequestKind::Redemption, redemption.id).await.is_err());

    let mine = h
        .requests
        .submit(
            stray.id,
            winner.id,
            RequestDetails::Adoption {
                applicant: ApplicantDetails {
                    housing: Some("house with yard".into()),
                    ..ApplicantDetails::default()
                },
            },
        )
        .await
        .unwrap();
    let theirs = h
        .submit(RequestKind::Adoption, stray.id, other.id)
        .await
        .unwrap();

    let approved = h
        .requests
        .set_status(RequestKind::Adoption, mine.id, RequestStatus::Approved)
        .await
        .unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);

    let theirs = h.requests.get(RequestKind::Adoption, theirs.id).await.unwrap();
    assert_eq!(theirs.status, RequestStatus::Rejected);
    assert_eq!(h.strays.get(stray.id).await.unwrap().status, StrayStatus::Adopted);
    // Untagged: no pet identity exists yet.
    assert_eq!(h.store.pet_rows().await, 0);
}

#[tokio::test]
async fn second_adoption_approval_conflicts() {
    let h = harness();
    let a = h.owner("A").await.unwrap();
    let b = h.owner("B").await.unwrap();
    let stray = h.stray_in(StrayStatus::Adoption, None).await.unwrap();
    let first = h.submit(RequestKind::Adoption, stray.id, a.id).await.unwrap();
    let second = h.submit(RequestKind::Adoption, stray.id, b.id).await.unwrap();

    h.requests
        .set_status(RequestKind::Adoption, first.id, RequestStatus::Approved)
        .await
        .unwrap();
    let err = h
        .requests
        .set_status(RequestKind::Adoption, second.id, RequestStatus::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, DispositionError::Conflict(_)));
}

#[tokio::test]
async fn review_rejects_illegal_moves() {
    let h = harness();
    let owner = h.owner("Ada").await.unwrap();
    let stray = h.capture(None).await.unwrap();
    let request = h
        .submit(RequestKind::Redemption, stray.id, owner.id)
        .await
        .unwrap();

    let err = h
        .requests
        .set_status(RequestKind::Redemption, request.id, RequestStatus::Archived)
        .await
        .unwrap_err();
    assert!(matches!(err, DispositionError::Conflict(_)));

    h.requests
        .set_status(RequestKind::Redemption, request.id, RequestStatus::Rejected)
        .await
        .unwrap();
    let err = h
        .requests
        .set_status(RequestKind::Redemption, request.id, RequestStatus::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, DispositionError::Conflict(_)));

    let err = h
        .requests
        .set_status(RequestKind::Adoption, request.id, RequestStatus::Approved)
        .await
        .unwrap_err();
    assert!(matches!(err, DispositionError::NotFound { .. }));
}

#[tokio::test]
async fn euthanasia_rejects_open_requests() {
    let h = harness();
    let owner = h.owner("Ada").await.unwrap();
    let stray = h.capture(None).await.unwrap();
    let pending = h
        .submit(RequestKind::Redemption, stray.id, owner.id)
        .await
        .unwrap();
    let approved = h
        .approved(RequestKind::Redemption, stray.id, owner.id)
        .await
        .unwrap();

    h.strays
        .update_status(stray.id, StrayStatus::Euthanized)
        .await
        .unwrap();

    for id in [pending.id, approved.id] {
        let request = h.requests.get(RequestKind::Redemption, id).await.unwrap();
        assert_eq!(request.status, RequestStatus::Rejected);
    }
    let err = h
        .claim(RequestKind::Redemption, approved.id, Some("RF1"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, DispositionError::Conflict(_)));
}

#[tokio::test]
async fn manual_status_updates_are_limited() {
    let h = harness();
    let stray = h.capture(None).await.unwrap();

    for reserved in [StrayStatus::Adopted, StrayStatus::Claimed, StrayStatus::Captured] {
        let err = h.strays.update_status(stray.id, reserved).await.unwrap_err();
        assert!(matches!(err, DispositionError::Conflict(_)), "{reserved}");
    }
    // captured -> adoption skips observation.
    assert!(h.strays.update_status(stray.id, StrayStatus::Adoption).await.is_err());
    assert!(matches!(
        h.strays.update_status(StrayId::new(404), StrayStatus::Observation).await,
        Err(DispositionError::NotFound { .. })
    ));
}

#[tokio::test]
async fn redemption_listing_hides_adoption_workflow() {
    let h = harness();
    let owner = h.owner("Ada").await.unwrap();
    let stray = h.capture(Some("RF42")).await.unwrap();
    h.submit(RequestKind::Redemption, stray.id, owner.id)
        .await
        .unwrap();
    let other = h.capture(None).await.unwrap();
    h.submit(RequestKind::Redemption, other.id, owner.id)
        .await
        .unwrap();

    let listings = h
        .requests
        .list(RequestFilter::all(RequestKind::Redemption))
        .await
        .unwrap();
    assert_eq!(listings.len(), 2);
    let tagged = listings
        .iter()
        .find(|l| l.request.stray_id == stray.id)
        .unwrap();
    assert_eq!(tagged.requester_name, "Ada");
    assert_eq!(tagged.stray_tag.as_ref().map(|t| t.as_str()), Some("RF42"));

    h.strays
        .update_status(other.id, StrayStatus::Observation)
        .await
        .unwrap();
    h.strays
        .update_status(other.id, StrayStatus::Adoption)
        .await
        .unwrap();

    let listings = h
        .requests
        .list(RequestFilter {
            status: Some(RequestStatus::Pending),
            ..RequestFilter::all(RequestKind::Redemption)
        })
        .await
        .unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].request.stray_id, stray.id);
}

#[tokio::test]
async fn capture_rejects_duplicate_tag() {
    let h = harness();
    h.capture(Some("RF7")).await.unwrap();
    let err = h.capture(Some("RF7")).await.unwrap_err();
    assert!(matches!(err, DispositionError::Conflict(_)));
}

#[tokio::test]
async fn recompute_for_unknown_owner_is_not_found() {
    let h = harness();
    let err = h
        .owners
        .recompute_pet_counts(Some(OwnerId::new(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, DispositionError::NotFound { .. }));
}

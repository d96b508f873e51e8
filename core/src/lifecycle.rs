//! Disposition state machine.
//!
//! Legal status transitions for stray animals and for adoption/redemption
//! requests, plus the guards consulted before a request is created.
//!
//! # Stray animal
//!
//! ```text
//! captured ──► observation ──► adoption ──► adopted ──► claimed
//!    │              │                          ▲
//!    └──────────────┴──────── redemption ──────┘ (claimed)
//!
//! any non-terminal state ──► euthanized
//! ```
//!
//! `claimed` and `euthanized` are terminal. `adopted` marks an approved
//! adoption that is waiting for the physical handover.
//!
//! # Requests
//!
//! ```text
//! pending ──► approved ──► archived   (archived only through a claim)
//!    └──────► rejected
//! ```

use crate::error::{DispositionError, Result};
use crate::types::{RequestKind, StrayAnimal};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a stray animal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrayStatus {
    /// Picked up by patrol, no decision yet
    Captured,
    /// Held for health/behaviour observation
    Observation,
    /// Open for adoption applications
    Adoption,
    /// Adoption approved, handover pending
    Adopted,
    /// Materialised as a `pet` row
    Claimed,
    /// Euthanized
    Euthanized,
}

impl StrayStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Captured,
        Self::Observation,
        Self::Adoption,
        Self::Adopted,
        Self::Claimed,
        Self::Euthanized,
    ];

    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Captured => "captured",
            Self::Observation => "observation",
            Self::Adoption => "adoption",
            Self::Adopted => "adopted",
            Self::Claimed => "claimed",
            Self::Euthanized => "euthanized",
        }
    }

    /// Parse status from its string representation.
    ///
    /// # Errors
    ///
    /// Returns [`DispositionError::InvalidArgument`] for unknown values.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "captured" => Ok(Self::Captured),
            "observation" => Ok(Self::Observation),
            "adoption" => Ok(Self::Adoption),
            "adopted" => Ok(Self::Adopted),
            "claimed" => Ok(Self::Claimed),
            "euthanized" => Ok(Self::Euthanized),
            _ => Err(DispositionError::invalid(format!(
                "unknown stray status: {s}"
            ))),
        }
    }

    /// No transition leaves a terminal status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Claimed | Self::Euthanized)
    }

    /// Whether `self → next` is a legal forward move.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Captured,
                Self::Observation | Self::Claimed | Self::Euthanized
            ) | (
                Self::Observation,
                Self::Adoption | Self::Claimed | Self::Euthanized
            ) | (Self::Adoption, Self::Adopted | Self::Euthanized)
                | (Self::Adopted, Self::Claimed | Self::Euthanized)
        )
    }

    /// Validate `self → next`.
    ///
    /// # Errors
    ///
    /// Returns [`DispositionError::Conflict`] if the move is not legal.
    pub fn transition(self, next: Self) -> Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DispositionError::conflict(format!(
                "stray cannot move from {self} to {next}"
            )))
        }
    }

    /// Statuses an operator may set directly. `adopted` and `claimed` are
    /// only reached through approval and claim.
    #[must_use]
    pub const fn is_manual_target(self) -> bool {
        matches!(self, Self::Observation | Self::Adoption | Self::Euthanized)
    }

    /// Adoption applications require the animal to be listed for adoption.
    #[must_use]
    pub const fn accepts_adoption_requests(self) -> bool {
        matches!(self, Self::Adoption)
    }

    /// Redemption is for animals that are neither in the adoption workflow
    /// nor terminal.
    #[must_use]
    pub const fn accepts_redemption_requests(self) -> bool {
        matches!(self, Self::Captured | Self::Observation)
    }

    /// Redemption requests may not coexist with these statuses.
    #[must_use]
    pub const fn excludes_redemption(self) -> bool {
        matches!(self, Self::Adoption | Self::Adopted)
    }
}

impl fmt::Display for StrayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an adoption or redemption request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Submitted, awaiting review
    Pending,
    /// Approved, awaiting claim
    Approved,
    /// Rejected by staff or by a competing approval
    Rejected,
    /// Claimed; the animal is now a pet
    Archived,
}

impl RequestStatus {
    /// Every status.
    pub const ALL: [Self; 4] = [
        Self::Pending,
        Self::Approved,
        Self::Rejected,
        Self::Archived,
    ];

    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Archived => "archived",
        }
    }

    /// Parse status from its string representation.
    ///
    /// # Errors
    ///
    /// Returns [`DispositionError::InvalidArgument`] for anything other than
    /// `pending`, `approved`, `rejected` or `archived`.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "archived" => Ok(Self::Archived),
            _ => Err(DispositionError::invalid(format!(
                "unknown request status: {s}"
            ))),
        }
    }

    /// `rejected` and `archived` are final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Archived)
    }

    /// Open requests still compete for the animal.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }

    /// Whether `self → next` is a legal move.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved | Self::Rejected) | (Self::Approved, Self::Archived)
        )
    }

    /// Validate a status change requested through `SetStatus`.
    ///
    /// `archived` is legal after `approved` but only a claim may perform it,
    /// so it is refused here.
    ///
    /// # Errors
    ///
    /// Returns [`DispositionError::Conflict`] for illegal or claim-only moves.
    pub fn review(self, next: Self) -> Result<Self> {
        if next == Self::Archived {
            return Err(DispositionError::conflict(
                "requests are archived by claiming them",
            ));
        }
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DispositionError::conflict(format!(
                "request cannot move from {self} to {next}"
            )))
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guard consulted before a request is persisted.
///
/// # Errors
///
/// Returns [`DispositionError::Conflict`] when the stray's status does not
/// admit a request of this kind.
pub fn guard_submission(kind: RequestKind, stray: &StrayAnimal) -> Result<()> {
    match kind {
        RequestKind::Adoption if !stray.status.accepts_adoption_requests() => {
            Err(DispositionError::conflict(format!(
                "stray {} is {}, adoption requires status adoption",
                stray.id, stray.status
            )))
        }
        RequestKind::Redemption if !stray.status.accepts_redemption_requests() => {
            Err(DispositionError::conflict(format!(
                "stray {} is {}, it cannot be redeemed",
                stray.id, stray.status
            )))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Position along the forward path; `euthanized` sits after everything.
    const fn rank(status: StrayStatus) -> u8 {
        match status {
            StrayStatus::Captured => 0,
            StrayStatus::Observation => 1,
            StrayStatus::Adoption => 2,
            StrayStatus::Adopted => 3,
            StrayStatus::Claimed => 4,
            StrayStatus::Euthanized => 5,
        }
    }

    #[test]
    fn stray_status_roundtrip() {
        for status in StrayStatus::ALL {
            assert_eq!(StrayStatus::parse(status.as_str()), Ok(status));
        }
        assert!(StrayStatus::parse("lost").is_err());
    }

    #[test]
    fn request_status_roundtrip() {
        for status in RequestStatus::ALL {
            assert_eq!(RequestStatus::parse(status.as_str()), Ok(status));
        }
        assert!(matches!(
            RequestStatus::parse("cancelled"),
            Err(DispositionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn stray_transitions_never_regress() {
        for from in StrayStatus::ALL {
            for to in StrayStatus::ALL {
                if from.can_transition_to(to) {
                    assert!(rank(to) > rank(from), "{from} -> {to} regresses");
                }
            }
        }
    }

    #[test]
    fn terminal_strays_have_no_exits() {
        for to in StrayStatus::ALL {
            assert!(!StrayStatus::Claimed.can_transition_to(to));
            assert!(!StrayStatus::Euthanized.can_transition_to(to));
        }
    }

    #[test]
    fn every_non_terminal_stray_can_be_euthanized() {
        for from in StrayStatus::ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert!(from.can_transition_to(StrayStatus::Euthanized));
        }
    }

    #[test]
    fn claimed_cannot_return_to_adoption() {
        assert!(matches!(
            StrayStatus::Claimed.transition(StrayStatus::Adoption),
            Err(DispositionError::Conflict(_))
        ));
    }

    #[test]
    fn redemption_path_skips_adoption() {
        assert!(StrayStatus::Captured.can_transition_to(StrayStatus::Claimed));
        assert!(StrayStatus::Observation.can_transition_to(StrayStatus::Claimed));
        assert!(!StrayStatus::Adoption.can_transition_to(StrayStatus::Claimed));
    }

    #[test]
    fn request_review_rules() {
        assert_eq!(
            RequestStatus::Pending.review(RequestStatus::Approved),
            Ok(RequestStatus::Approved)
        );
        assert_eq!(
            RequestStatus::Pending.review(RequestStatus::Rejected),
            Ok(RequestStatus::Rejected)
        );
        assert!(RequestStatus::Approved.review(RequestStatus::Archived).is_err());
        assert!(RequestStatus::Rejected.review(RequestStatus::Approved).is_err());
        assert!(RequestStatus::Archived.review(RequestStatus::Pending).is_err());
        assert!(RequestStatus::Approved.review(RequestStatus::Pending).is_err());
    }

    #[test]
    fn terminal_requests_have_no_exits() {
        for to in RequestStatus::ALL {
            assert!(!RequestStatus::Rejected.can_transition_to(to));
            assert!(!RequestStatus::Archived.can_transition_to(to));
        }
    }
}

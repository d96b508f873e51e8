//! # Animal Control Core
//!
//! Stray-animal disposition and claim engine.
//!
//! A captured stray leaves the shelter in one of three ways: it is adopted
//! by a new owner, redeemed by the owner who lost it, or euthanized. This
//! crate holds the rules for those workflows and the transactions that
//! carry them out:
//!
//! - [`lifecycle`]: legal status transitions for strays and requests
//! - [`requests`]: submitting and reviewing adoption/redemption requests
//! - [`claim`]: the handover that turns an approved request into a `pet` row
//! - [`ownership`]: collapsing the `pet` rows for a hardware tag onto one owner
//! - [`strays`], [`owners`]: intake, manual status changes, owner records
//! - [`store`]: the transactional entity store the services run against
//!
//! ## Architecture
//!
//! - Functional core, imperative shell: state machine checks and ownership
//!   planning are pure functions; the services execute their results inside
//!   one store transaction
//! - Storage behind traits: `PostgresEntityStore` in production,
//!   `InMemoryEntityStore` in tests
//! - Time injected through [`environment::Clock`]
//!
//! ## Example
//!
//! ```ignore
//! use animal_control_core::*;
//!
//! let claims = ClaimService::new(store, clock);
//! let receipt = claims
//!     .claim(ClaimCommand {
//!         kind: RequestKind::Redemption,
//!         request_id: RequestId::new(9),
//!         hardware_tag: Some(HardwareTag::parse("RF100")?),
//!         manual_entry: false,
//!     })
//!     .await?;
//! ```

pub mod claim;
pub mod error;
pub mod lifecycle;
pub mod owners;
pub mod ownership;
pub mod requests;
pub mod store;
pub mod strays;
pub mod types;

pub use claim::ClaimService;
pub use error::{DispositionError, Result};
pub use lifecycle::{RequestStatus, StrayStatus};
pub use owners::OwnerService;
pub use ownership::{ReconcileMode, reconcile_ownership};
pub use requests::RequestLifecycleService;
pub use store::{EntityStore, StoreTransaction};
pub use strays::StrayService;
pub use types::{
    ApplicantDetails, Attachments, ClaimCommand, ClaimReceipt, DispositionRequest, HardwareTag,
    NewOwner, NewStray, Owner, OwnerId, Pet, PetCountCorrection, PetId, PetStatus, RequestDetails,
    RequestFilter, RequestId, RequestKind, RequestListing, StrayAnimal, StrayId,
};

/// Injected dependencies.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

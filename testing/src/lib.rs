//! # Animal Control Testing
//!
//! Testing utilities for the disposition engine.
//!
//! This crate provides:
//! - [`InMemoryEntityStore`]: transactional in-memory entity store
//! - [`FixedClock`]: deterministic time
//! - [`Harness`]: every service over one store, with scenario shortcuts
//! - [`properties`]: proptest strategies for domain values
//!
//! ## Example
//!
//! ```ignore
//! use animal_control_testing::{Harness, InMemoryEntityStore};
//! use animal_control_core::{RequestKind, StrayStatus};
//!
//! #[tokio::test]
//! async fn redemption_claim() {
//!     let h = Harness::new(InMemoryEntityStore::new());
//!     let owner = h.owner("Ada").await.unwrap();
//!     let stray = h.stray_in(StrayStatus::Observation, Some("RF100")).await.unwrap();
//!     let request = h.approved(RequestKind::Redemption, stray.id, owner.id).await.unwrap();
//!
//!     let receipt = h.claim(RequestKind::Redemption, request.id, None, false).await.unwrap();
//!     assert_eq!(receipt.owner_id, owner.id);
//! }
//! ```

use animal_control_core::environment::Clock;
use chrono::{DateTime, Utc};

pub mod fixtures;
pub mod memory;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use animal_control_testing::mocks::FixedClock;
    /// use animal_control_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use animal_control_core::lifecycle::{RequestStatus, StrayStatus};
    use proptest::prelude::*;

    /// Any stray status.
    pub fn arb_stray_status() -> impl Strategy<Value = StrayStatus> {
        prop::sample::select(StrayStatus::ALL.to_vec())
    }

    /// Any request status.
    pub fn arb_request_status() -> impl Strategy<Value = RequestStatus> {
        prop::sample::select(RequestStatus::ALL.to_vec())
    }

    /// Status sequences an operator might try, starting from `captured`.
    pub fn arb_status_walk() -> impl Strategy<Value = Vec<StrayStatus>> {
        prop::collection::vec(arb_stray_status(), 0..8)
    }
}

/// Install a `tracing` subscriber for the current test binary.
///
/// Honours `RUST_LOG`; safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub use fixtures::Harness;
pub use memory::{InMemoryEntityStore, InMemoryTransaction};
pub use mocks::{FixedClock, test_clock};

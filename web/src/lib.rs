//! HTTP surface for the stray disposition and claim services.
//!
//! Handlers are thin: they parse the path, query and body, call one service
//! operation and map [`DispositionError`](animal_control_core::DispositionError)
//! to a status code through [`AppError`].
//!
//! | Error              | Status |
//! |--------------------|--------|
//! | `NotFound`         | 404    |
//! | `Conflict`         | 409    |
//! | `InvalidArgument`  | 400    |
//! | `Internal`         | 500, generic body |
//!
//! # Example
//!
//! ```ignore
//! use animal_control_web::{AppState, router};
//!
//! let state = AppState::new(Arc::new(store), Arc::new(SystemClock));
//! let app = router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::AppError;
pub use extractors::{ApiJson, ApiPath, ApiQuery, CorrelationId};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use router::router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

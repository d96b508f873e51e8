//! HTTP request handlers, one module per resource.

pub mod health;
pub mod owners;
pub mod requests;
pub mod strays;

pub use health::health_check;

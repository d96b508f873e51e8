//! Tracing subscriber and Prometheus exporter setup.
//!
//! # Exported Metrics
//!
//! - `disposition.requests.submitted{kind}`
//! - `disposition.claims.completed`
//! - `disposition.claims.conflicts`
//! - `disposition.pet_count.adjust_failed`
//! - `disposition.pet_count.corrections`

use anyhow::Context;
use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,animal_control=debug,sqlx=warn";

/// Install the global tracing subscriber.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Start the Prometheus scrape endpoint on `addr` and describe the counters.
///
/// # Errors
///
/// Returns an error if `addr` does not parse or the exporter cannot bind.
pub fn install_metrics(addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid metrics address {addr}"))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus exporter")?;

    register_metrics();
    tracing::info!(%addr, "Prometheus metrics available at http://{addr}/metrics");
    Ok(())
}

fn register_metrics() {
    describe_counter!(
        "disposition.requests.submitted",
        "Adoption and redemption requests accepted, by kind"
    );
    describe_counter!(
        "disposition.claims.completed",
        "Claims that produced or transferred a pet row"
    );
    describe_counter!(
        "disposition.claims.conflicts",
        "Claims refused because of a state or tag conflict"
    );
    describe_counter!(
        "disposition.pet_count.adjust_failed",
        "Best-effort pet_count adjustments that failed"
    );
    describe_counter!(
        "disposition.pet_count.corrections",
        "Owner counters rewritten by a recompute"
    );
}

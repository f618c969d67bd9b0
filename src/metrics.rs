use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "feed_records_fetched_total",
            "Event records returned by the store, decodable or not."
        );
        describe_counter!(
            "feed_records_skipped_total",
            "Event records skipped because they failed to decode."
        );
        describe_counter!(
            "feed_events_kept_total",
            "Events kept in the working set after filtering."
        );
        describe_counter!(
            "conversation_messages_emitted_total",
            "Bot messages produced by the conversation."
        );
        describe_counter!("store_fetch_errors_total", "Failed event fetches.");
        describe_counter!("store_write_errors_total", "Failed message writes.");
        describe_counter!(
            "settings_watermark_resets_total",
            "Seen-watermark resets on a new calendar day."
        );
        describe_gauge!("feed_working_set_len", "Events left to surface today.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder for this process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

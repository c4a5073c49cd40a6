//! Prometheus metrics

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder. Safe to call once at startup.
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HANDLE.set(handle.clone());
            Some(handle)
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to install metrics recorder");
            None
        }
    }
}

/// Render the metrics exposition for `/metrics`.
pub async fn metrics_handler() -> String {
    HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

pub fn record_turn(outcome: &'static str) {
    counter!("avatar_turns_total", "outcome" => outcome).increment(1);
}

pub fn record_llm_latency(ms: u64) {
    histogram!("avatar_llm_latency_ms").record(ms as f64);
}

pub fn record_barge_in() {
    counter!("avatar_barge_ins_total").increment(1);
}

pub fn record_error(phase: &'static str) {
    counter!("avatar_errors_total", "phase" => phase).increment(1);
}

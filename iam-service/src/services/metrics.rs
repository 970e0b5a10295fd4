//! Metrics collection and Prometheus export.
//!
//! Installs the global recorder and exposes the rendered text for `/metrics`.

use metrics::counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global handle to the Prometheus recorder.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Calling it again is a no-op.
pub fn init_metrics() -> Result<(), BuildError> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

/// Current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

pub fn record_identity_cache(hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    counter!("iam_identity_cache_lookups_total", "outcome" => outcome).increment(1);
}

pub fn record_identity_provisioned() {
    counter!("iam_identities_provisioned_total").increment(1);
}

pub fn record_permission_check(allowed: bool) {
    let outcome = if allowed { "allowed" } else { "denied" };
    counter!("iam_permission_checks_total", "outcome" => outcome).increment(1);
}

pub fn record_authentication_failure(reason: &'static str) {
    counter!("iam_authentication_failures_total", "reason" => reason).increment(1);
}

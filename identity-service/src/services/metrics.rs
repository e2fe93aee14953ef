//! Metrics collection and Prometheus export.
//!
//! Installs the global recorder and records identity-flow counters. HTTP
//! request metrics come from `service_core::middleware::metrics`.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;
use std::sync::OnceLock;

use crate::models::{OtpPurpose, Scope};

/// Global handle to the Prometheus recorder.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics recorder. A second call is a no-op.
pub fn init_metrics() -> Result<(), AppError> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))
    })?;

    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

/// Get the current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

pub fn record_otp_issued(purpose: OtpPurpose, scope: Scope) {
    metrics::counter!(
        "identity_otp_issued_total",
        "purpose" => purpose.as_str(),
        "scope" => scope.as_str()
    )
    .increment(1);
}

pub fn record_otp_failure(reason: &'static str) {
    metrics::counter!("identity_otp_verify_failures_total", "reason" => reason).increment(1);
}

pub fn record_login(scope: Scope, method: &'static str) {
    metrics::counter!(
        "identity_logins_total",
        "scope" => scope.as_str(),
        "method" => method
    )
    .increment(1);
}

pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("identity_refresh_rotations_total", "outcome" => outcome).increment(1);
}

pub fn record_admin_request(outcome: &'static str) {
    metrics::counter!("identity_admin_requests_total", "outcome" => outcome).increment(1);
}

//! OpenTelemetry metrics for the operator
//!
//! Instruments are created lazily against the global meter, so they are
//! no-ops until telemetry export is configured.

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::KeyValue;

static METER: Lazy<Meter> = Lazy::new(|| global::meter("tigera-operator"));

/// Counter of reconcile passes
///
/// Labels:
/// - `controller`: e.g. "manager"
/// - `result`: success, waiting, error
pub static RECONCILES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("tigera_operator_reconciles_total")
        .with_description("Total number of reconcile passes")
        .with_unit("{reconciles}")
        .build()
});

/// Histogram of reconcile duration
///
/// Labels:
/// - `controller`
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("tigera_operator_reconcile_duration_seconds")
        .with_description("Duration of reconcile passes in seconds")
        .with_unit("s")
        .build()
});

/// Gauge set to 1 while a component is degraded, 0 otherwise
///
/// Labels:
/// - `component`: TigeraStatus name
/// - `reason`: status reason, e.g. ResourceNotReady
pub static DEGRADED: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("tigera_operator_component_degraded")
        .with_description("Whether a component is degraded")
        .build()
});

/// Counter of certificates issued by the operator CA
///
/// Labels:
/// - `secret`: key pair name
pub static CERTIFICATES_ISSUED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("tigera_operator_certificates_issued_total")
        .with_description("Total number of certificates issued by the operator CA")
        .with_unit("{certificates}")
        .build()
});

/// Outcome of a reconcile pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileResult {
    /// Everything was applied
    Success,
    /// Blocked on a dependency
    Waiting,
    /// Returned an error
    Error,
}

impl ReconcileResult {
    fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Waiting => "waiting",
            Self::Error => "error",
        }
    }
}

/// Record one reconcile pass
pub fn record_reconcile(controller: &str, result: ReconcileResult, seconds: f64) {
    RECONCILES.add(
        1,
        &[
            KeyValue::new("controller", controller.to_string()),
            KeyValue::new("result", result.as_str()),
        ],
    );
    RECONCILE_DURATION.record(seconds, &[KeyValue::new("controller", controller.to_string())]);
}

/// Record the degraded state of a component
pub fn record_degraded(component: &str, reason: Option<&str>) {
    DEGRADED.record(
        i64::from(reason.is_some()),
        &[
            KeyValue::new("component", component.to_string()),
            KeyValue::new("reason", reason.unwrap_or_default().to_string()),
        ],
    );
}

/// Record a certificate issued by the operator CA
pub fn record_certificate_issued(secret: &str) {
    CERTIFICATES_ISSUED.add(1, &[KeyValue::new("secret", secret.to_string())]);
}

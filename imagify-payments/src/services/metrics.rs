use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static PAYMENTS_INITIATED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static PAYMENT_CALLBACKS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static PAYMENT_AMOUNT_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

pub fn init_metrics() {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if METRICS_HANDLE.set(handle).is_err() {
        panic!("failed to set metrics handle: already initialized");
    }

    let registry = Registry::new();

    let initiated_counter = IntCounterVec::new(
        Opts::new(
            "vnpay_payments_initiated_total",
            "Payment URLs issued by credit plan",
        ),
        &["plan"],
    )
    .expect("Failed to create vnpay_payments_initiated_total metric");

    let callbacks_counter = IntCounterVec::new(
        Opts::new(
            "vnpay_callbacks_total",
            "Return callbacks by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create vnpay_callbacks_total metric");

    let amount_counter = IntCounterVec::new(
        Opts::new(
            "vnpay_payment_amount_vnd_total",
            "Completed payment amounts by credit plan (VND)",
        ),
        &["plan"],
    )
    .expect("Failed to create vnpay_payment_amount_vnd_total metric");

    registry
        .register(Box::new(initiated_counter.clone()))
        .expect("Failed to register vnpay_payments_initiated_total");
    registry
        .register(Box::new(callbacks_counter.clone()))
        .expect("Failed to register vnpay_callbacks_total");
    registry
        .register(Box::new(amount_counter.clone()))
        .expect("Failed to register vnpay_payment_amount_vnd_total");

    PROMETHEUS_REGISTRY
        .set(registry)
        .expect("Failed to set prometheus registry");
    PAYMENTS_INITIATED_TOTAL
        .set(initiated_counter)
        .expect("Failed to set vnpay_payments_initiated_total");
    PAYMENT_CALLBACKS_TOTAL
        .set(callbacks_counter)
        .expect("Failed to set vnpay_callbacks_total");
    PAYMENT_AMOUNT_TOTAL
        .set(amount_counter)
        .expect("Failed to set vnpay_payment_amount_vnd_total");
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// Record an issued payment URL.
pub fn record_payment_initiated(plan: &str) {
    if let Some(counter) = PAYMENTS_INITIATED_TOTAL.get() {
        counter.with_label_values(&[plan]).inc();
    }
}

/// Record a return-callback outcome (completed, failed, invalid_signature, ...).
pub fn record_callback(outcome: &str) {
    if let Some(counter) = PAYMENT_CALLBACKS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Record the VND amount of a completed payment.
pub fn record_completed_amount(plan: &str, amount_vnd: u64) {
    if let Some(counter) = PAYMENT_AMOUNT_TOTAL.get() {
        counter.with_label_values(&[plan]).inc_by(amount_vnd);
    }
}

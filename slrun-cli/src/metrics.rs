// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Prometheus metrics for the gateway, served on `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge,
};

/// Label used for names that do not resolve to a configured function.
pub const UNKNOWN_FUNCTION: &str = "unknown";

lazy_static! {
    pub static ref INVOCATIONS: IntCounterVec = register_int_counter_vec!(
        "slrun_invocations_total",
        "Total number of invocations routed through the gateway",
        &["function", "outcome"]
    )
    .unwrap();
    pub static ref INVOCATION_DURATION: HistogramVec = register_histogram_vec!(
        "slrun_invocation_duration_seconds",
        "Round-trip time of invocations forwarded to a function",
        &["function"],
        vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 5.0, 30.0]
    )
    .unwrap();
    pub static ref RUNNING_FUNCTIONS: IntGauge = register_int_gauge!(
        "slrun_running_functions",
        "Number of functions with a running container"
    )
    .unwrap();
}

/// Register every metric so they appear before their first use.
pub fn init() {
    lazy_static::initialize(&INVOCATIONS);
    lazy_static::initialize(&INVOCATION_DURATION);
    lazy_static::initialize(&RUNNING_FUNCTIONS);
}

/// Record one invocation outcome. `elapsed` is only given for calls that
/// reached the function.
pub fn record_invocation(function: &str, outcome: &str, elapsed: Option<f64>) {
    INVOCATIONS.with_label_values(&[function, outcome]).inc();
    if let Some(seconds) = elapsed {
        INVOCATION_DURATION
            .with_label_values(&[function])
            .observe(seconds);
    }
}

/// Render the default registry in the text exposition format.
pub fn metrics_handler() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|_| String::from("Encoding error"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_rendered() {
        init();
        record_invocation("echo", "ok", Some(0.002));
        RUNNING_FUNCTIONS.set(1);

        let text = metrics_handler();
        assert!(text.contains("slrun_invocations_total"));
        assert!(text.contains("function=\"echo\""));
        assert!(text.contains("slrun_running_functions"));
    }
}

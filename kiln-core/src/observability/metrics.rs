//! Core metrics definitions.
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters
//! - `_seconds` suffix for histograms measuring duration

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Register all core metrics with descriptions.
pub fn register_core_metrics() {
    // Store metrics
    describe_counter!("kiln_store_txn_total", "Total number of store transactions opened");

    // Bootstrap metrics
    describe_counter!(
        "kiln_bootstrap_attempts_total",
        "Total number of boot attempts (by driver)"
    );
    describe_histogram!(
        "kiln_boot_duration_seconds",
        "Time taken to bring a node to a connectable state (by driver)"
    );

    // Driver metrics
    describe_counter!(
        "kiln_driver_failures_total",
        "Total number of driver failures (by driver, reason)"
    );
}

/// Helper functions for common metric patterns
pub fn record_boot(duration_secs: f64, driver: &str) {
    histogram!("kiln_boot_duration_seconds", "driver" => driver.to_string()).record(duration_secs);
}

pub fn record_driver_failure(driver: &str, reason: &'static str) {
    counter!("kiln_driver_failures_total", "driver" => driver.to_string(), "reason" => reason)
        .increment(1);
}

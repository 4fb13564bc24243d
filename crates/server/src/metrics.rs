//! Prometheus metrics for the firmware builder.
//!
//! The `/metrics` endpoint is unauthenticated. Metrics carry variant ids and
//! failure reasons only, never configuration content.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use mtfw_builder::{SweepStats, TimingBreakdown};
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static BUILDS_STARTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("mtfw_builds_started_total", "Firmware builds started by format"),
        &["format"],
    )
    .expect("metric creation failed")
});

pub static BUILDS_SUCCEEDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "mtfw_builds_succeeded_total",
        "Firmware builds that produced a downloadable image",
    )
    .expect("metric creation failed")
});

pub static BUILDS_FAILED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("mtfw_builds_failed_total", "Failed firmware builds by reason"),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static BUILDS_IN_FLIGHT: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("mtfw_builds_in_flight", "Builds currently running")
        .expect("metric creation failed")
});

/// Counts one build in `BUILDS_IN_FLIGHT` until dropped, including when the
/// request future is dropped mid-build.
pub struct InFlightBuild(());

impl InFlightBuild {
    pub fn start() -> Self {
        BUILDS_IN_FLIGHT.inc();
        Self(())
    }
}

impl Drop for InFlightBuild {
    fn drop(&mut self) {
        BUILDS_IN_FLIGHT.dec();
    }
}

pub static BUILD_PHASE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mtfw_build_phase_duration_seconds",
            "Wall time per build phase",
        )
        .buckets(vec![
            0.05, 0.25, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0,
        ]),
        &["phase"],
    )
    .expect("metric creation failed")
});

pub static DOWNLOADS_SERVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("mtfw_downloads_served_total", "Firmware images served")
        .expect("metric creation failed")
});

pub static SWEEP_REMOVALS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mtfw_sweep_removals_total",
            "Items removed by retention sweeps",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static CLEANUP_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "mtfw_cleanup_failures_total",
        "Files or directories that could not be removed",
    )
    .expect("metric creation failed")
});

pub static SOURCE_UPDATES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("mtfw_source_updates_total", "Firmware source updates by outcome"),
        &["outcome"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
/// Safe to call more than once.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(BUILDS_STARTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BUILDS_SUCCEEDED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BUILDS_FAILED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BUILDS_IN_FLIGHT.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BUILD_PHASE_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOWNLOADS_SERVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SWEEP_REMOVALS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CLEANUP_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SOURCE_UPDATES.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record per-phase timings of a successful build.
pub fn record_build_timing(timing: &TimingBreakdown) {
    for (phase, value) in [
        ("dependencies", timing.dependencies),
        ("file_operations", timing.file_operations),
        ("cache_warming", timing.cache_warming),
        ("compilation", timing.compilation),
        ("post_build", timing.post_build),
        ("cleanup", timing.cleanup),
        ("total", timing.total),
    ] {
        BUILD_PHASE_DURATION
            .with_label_values(&[phase])
            .observe(value.as_secs_f64());
    }
}

pub fn record_build_failure(reason: &str) {
    BUILDS_FAILED.with_label_values(&[reason]).inc();
}

pub fn record_sweep(stats: &SweepStats) {
    SWEEP_REMOVALS
        .with_label_values(&["request_dir"])
        .inc_by(stats.builds_removed as u64);
    SWEEP_REMOVALS
        .with_label_values(&["tree_file"])
        .inc_by(stats.tree_files_removed as u64);
    SWEEP_REMOVALS
        .with_label_values(&["scratch_dir"])
        .inc_by(stats.scratch_dirs_removed as u64);
    CLEANUP_FAILURES.inc_by(stats.errors as u64);
}

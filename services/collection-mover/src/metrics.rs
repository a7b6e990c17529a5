// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Prometheus metrics for the collection mover
//!
//! Exports counters for:
//! - Move jobs dispatched, completed and failed
//! - Chunks moved and chunk retries

use collection_mover_types::JobStatus;
use prometheus::{IntCounter, Opts, Registry, TextEncoder};

// Metric definitions are constant; a failure here is a programming error
// and should panic at startup.
//
// This module exists to scope the clippy allow attributes to just the metric definitions.
#[allow(clippy::expect_used)]
mod metrics_impl {
    use super::*;
    use lazy_static::lazy_static;

    lazy_static! {
        /// Registry for all mover metrics
        pub static ref REGISTRY: Registry = Registry::new();

        pub static ref JOBS_DISPATCHED: IntCounter = IntCounter::with_opts(
            Opts::new(
                "collection_mover_jobs_dispatched_total",
                "Total bulk move jobs accepted"
            )
        ).expect("valid metric name");

        pub static ref JOBS_COMPLETED: IntCounter = IntCounter::with_opts(
            Opts::new(
                "collection_mover_jobs_completed_total",
                "Total bulk move jobs that moved every chunk"
            )
        ).expect("valid metric name");

        pub static ref JOBS_FAILED: IntCounter = IntCounter::with_opts(
            Opts::new(
                "collection_mover_jobs_failed_total",
                "Total bulk move jobs that ended failed"
            )
        ).expect("valid metric name");

        pub static ref CHUNKS_MOVED: IntCounter = IntCounter::with_opts(
            Opts::new(
                "collection_mover_chunks_moved_total",
                "Total chunks committed to storage"
            )
        ).expect("valid metric name");

        /// Retries after a transient chunk failure
        pub static ref CHUNK_RETRIES: IntCounter = IntCounter::with_opts(
            Opts::new(
                "collection_mover_chunk_retries_total",
                "Total chunk retries after transient failures"
            )
        ).expect("valid metric name");
    }
}

pub use metrics_impl::{
    CHUNK_RETRIES, CHUNKS_MOVED, JOBS_COMPLETED, JOBS_DISPATCHED, JOBS_FAILED, REGISTRY,
};

/// Register all metrics with the registry
///
/// Should be called once during application startup. Repeated calls are
/// ignored.
pub fn register_metrics() {
    let collectors = [
        &*JOBS_DISPATCHED,
        &*JOBS_COMPLETED,
        &*JOBS_FAILED,
        &*CHUNKS_MOVED,
        &*CHUNK_RETRIES,
    ];
    for counter in collectors {
        if let Err(e) = REGISTRY.register(Box::new(counter.clone())) {
            tracing::debug!(error = %e, "Metric already registered");
        }
    }
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}

pub fn record_job_dispatched() {
    JOBS_DISPATCHED.inc();
}

/// Count a job that reached `status`; non-terminal states are ignored.
pub fn record_job_finished(status: JobStatus) {
    match status {
        JobStatus::Completed => JOBS_COMPLETED.inc(),
        JobStatus::Failed => JOBS_FAILED.inc(),
        JobStatus::Pending | JobStatus::InProgress => {}
    }
}

pub fn record_chunk_moved() {
    CHUNKS_MOVED.inc();
}

pub fn record_chunk_retry() {
    CHUNK_RETRIES.inc();
}

//! Metric instrument factories for ticketq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"ticketq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for ticketq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("ticketq")
}

/// Counter: submission attempts.
/// Labels: `result` ("created" | "duplicate" | "rate_limited").
pub fn submissions() -> Counter<u64> {
    meter()
        .u64_counter("ticketq.submissions")
        .with_description("Number of job submission attempts")
        .build()
}

/// Counter: attempts rejected by the rate limiter.
/// Labels: `scope` ("global" | "per_user").
pub fn rate_limited() -> Counter<u64> {
    meter()
        .u64_counter("ticketq.rate_limited")
        .with_description("Submission attempts rejected by the rate limiter")
        .build()
}

/// Counter: job state transitions.
/// Labels: `from`, `to`.
pub fn job_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("ticketq.job.state_transitions")
        .with_description("Number of job state transitions")
        .build()
}

/// Counter: dispatch attempts that lost the `queued -> running` race.
pub fn transition_conflicts() -> Counter<u64> {
    meter()
        .u64_counter("ticketq.job.transition_conflicts")
        .with_description("Dispatch attempts that lost the claim race")
        .build()
}

/// Counter: jobs that ended in `failed`.
pub fn execution_failures() -> Counter<u64> {
    meter()
        .u64_counter("ticketq.job.execution_failures")
        .with_description("Jobs whose execution failed")
        .build()
}

/// Counter: jobs moved from `running` back to `queued` at startup.
pub fn recovered_jobs() -> Counter<u64> {
    meter()
        .u64_counter("ticketq.recovered_jobs")
        .with_description("Jobs re-queued by startup recovery")
        .build()
}

/// Histogram: job execution duration in milliseconds.
/// Labels: `outcome` ("done" | "failed").
pub fn job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("ticketq.job.duration_ms")
        .with_description("Job execution duration in milliseconds")
        .with_unit("ms")
        .build()
}

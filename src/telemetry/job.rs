//! Job execution span helpers.

use tracing::Span;

use crate::model::{JobId, State};

/// Start a span covering one job's claim, execution, and retirement.
///
/// `job.state` starts empty and follows [`record_state_transition`].
pub fn start_job_span(submitter_id: &str, job_id: &JobId) -> Span {
    tracing::info_span!(
        "job.execute",
        "job.submitter" = submitter_id,
        "job.id" = %job_id,
        "job.state" = tracing::field::Empty,
    )
}

/// Record a state transition on `span` and update its `job.state` field.
pub fn record_state_transition(span: &Span, from: State, to: State) {
    span.record("job.state", to.as_str());
    span.in_scope(|| {
        tracing::info!(from = from.as_str(), to = to.as_str(), "state_transition");
    });
}

//! Intake: the request-facing API. Admission, dedup, status, dashboard,
//! and the startup recovery hook.

use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::{info, warn};

use crate::db::Db;
use crate::error::{Error, Result};
use crate::idempotency::IdempotencyIndex;
use crate::limiter::{Admission, RateLimiter};
use crate::model::{Dashboard, Job, JobId};
use crate::telemetry::metrics;

use super::dispatcher::{Dispatcher, DispatcherConfig};
use super::executor::Executor;

/// An accepted submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub job: Job,
    /// `false` when the submission resolved to an existing job.
    pub is_new: bool,
}

/// Front door for submitters. Cheap to clone; clones share the limiter.
#[derive(Debug, Clone)]
pub struct Intake {
    db: Db,
    limiter: Arc<RateLimiter>,
    index: IdempotencyIndex,
}

impl Intake {
    pub fn new(db: Db, limiter: RateLimiter) -> Self {
        Self {
            index: IdempotencyIndex::new(db.clone()),
            db,
            limiter: Arc::new(limiter),
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Submit a job.
    ///
    /// Rate limiting runs first, so a duplicate of an existing job still
    /// spends budget. A rejection is [`Error::RateLimitExceeded`].
    pub async fn submit(&self, submitter_id: &str, payload: &str) -> Result<Submission> {
        if let Admission::Rejected(scope) = self.limiter.admit(submitter_id).await {
            let snapshot = self.limiter.snapshot().await;
            warn!(
                submitter_id,
                %scope,
                global_count = snapshot.global_count,
                tracked_submitters = snapshot.tracked_submitters,
                "submission rate limited"
            );
            metrics::submissions().add(1, &[KeyValue::new("result", "rate_limited")]);
            metrics::rate_limited().add(1, &[KeyValue::new("scope", scope.as_str())]);
            return Err(Error::RateLimitExceeded { scope });
        }

        let (job, is_new) = self.index.resolve(submitter_id, payload).await?;
        let result = if is_new { "created" } else { "duplicate" };
        info!(job_id = %job.id, submitter_id, result, "submission accepted");
        metrics::submissions().add(1, &[KeyValue::new("result", result)]);

        Ok(Submission { job, is_new })
    }

    /// Current state and timestamps of a job.
    pub async fn status(&self, id: JobId) -> Result<Job> {
        self.db.get_job(id).await
    }

    /// Counts by state plus the newest and the most recently failed jobs.
    pub async fn dashboard(&self, limit: i64) -> Result<Dashboard> {
        Ok(Dashboard {
            stats: self.db.count_by_state().await?,
            recent: self.db.recent_jobs(limit).await?,
            failed: self.db.failed_jobs(limit).await?,
        })
    }

    /// Re-queue jobs left `running` by a previous process.
    pub async fn recover(&self) -> Result<u64> {
        let recovered = self.db.reset_running_to_queued().await?;
        if recovered > 0 {
            warn!(recovered, "re-queued jobs interrupted by a previous run");
        }
        Ok(recovered)
    }

    /// Run recovery, then build the dispatcher. The only supported way to
    /// get a dispatcher that is safe to start.
    pub async fn startup<E: Executor>(
        &self,
        executor: E,
        config: DispatcherConfig,
    ) -> Result<Dispatcher<E>> {
        self.recover().await?;
        Ok(Dispatcher::new(self.db.clone(), executor, config))
    }
}

//! Job rows: insert-if-absent by fingerprint, conditional state
//! transitions, startup recovery, and the queries behind the dashboard.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Job, JobId, JobStats, NewJob, State};
use crate::telemetry::metrics;

const JOB_COLUMNS: &str = "id, submitter_id, fingerprint, payload, state, result, error, created_at, started_at, finished_at";

/// Validate a state transition, returning an error if disallowed.
fn validate_transition(from: State, to: State) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition { from, to })
    }
}

fn record_transition(from: State, to: State) {
    metrics::job_state_transitions().add(
        1,
        &[
            KeyValue::new("from", from.as_str()),
            KeyValue::new("to", to.as_str()),
        ],
    );
}

impl super::Db {
    /// Insert a new job in `queued`.
    ///
    /// Fails with [`Error::DuplicateFingerprint`] if a job with the same
    /// fingerprint already exists; the caller re-reads that row instead.
    pub async fn create_job(&self, new: NewJob) -> Result<Job> {
        let job = Job {
            id: JobId::new(),
            submitter_id: new.submitter_id,
            fingerprint: new.fingerprint,
            payload: new.payload,
            state: State::Queued,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };

        let inserted = sqlx::query(
            "INSERT INTO jobs (id, submitter_id, fingerprint, payload, state, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(job.id.0)
        .bind(&job.submitter_id)
        .bind(&job.fingerprint)
        .bind(&job.payload)
        .bind(job.state.as_str())
        .bind(job.created_at)
        .execute(self.pool())
        .await;

        match inserted {
            Ok(_) => Ok(job),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(Error::DuplicateFingerprint(job.fingerprint))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get a job by ID.
    pub async fn get_job(&self, id: JobId) -> Result<Job> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;

        row.ok_or_else(|| Error::NotFound(format!("job {id}")))?
            .try_into_job()
    }

    /// Look up the job holding a fingerprint, if any.
    pub async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE fingerprint = ?1"
        ))
        .bind(fingerprint)
        .fetch_optional(self.pool())
        .await?;

        row.map(JobRow::try_into_job).transpose()
    }

    /// Transition a job's state only if it is currently in `from`.
    ///
    /// Returns `true` iff this call applied the transition. A `false` means
    /// someone else moved the job first (or it doesn't exist); nothing was
    /// written either way.
    pub async fn transition_state(&self, id: JobId, from: State, to: State) -> Result<bool> {
        validate_transition(from, to)?;

        let now = Utc::now();
        let started_at = (to == State::Running).then_some(now);
        let finished_at = to.is_terminal().then_some(now);

        let rows_affected = sqlx::query(
            "UPDATE jobs SET state = ?1,
                 started_at = COALESCE(?2, started_at),
                 finished_at = COALESCE(?3, finished_at)
             WHERE id = ?4 AND state = ?5",
        )
        .bind(to.as_str())
        .bind(started_at)
        .bind(finished_at)
        .bind(id.0)
        .bind(from.as_str())
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected == 1 {
            record_transition(from, to);
        }
        Ok(rows_affected == 1)
    }

    /// Exclusively move a job from `queued` to `running` and return it.
    ///
    /// Fails with [`Error::TransitionConflict`] when the job was no longer
    /// queued.
    pub async fn claim(&self, id: JobId) -> Result<Job> {
        if !self
            .transition_state(id, State::Queued, State::Running)
            .await?
        {
            return Err(Error::TransitionConflict {
                id,
                expected: State::Queued,
            });
        }
        self.get_job(id).await
    }

    /// Finish a running job: `running -> done`, recording its output.
    pub async fn complete_job(&self, id: JobId, result: &str) -> Result<bool> {
        self.finish(id, State::Done, Some(result), None).await
    }

    /// Fail a running job: `running -> failed`, recording the error.
    pub async fn fail_job(&self, id: JobId, error: &str) -> Result<bool> {
        self.finish(id, State::Failed, None, Some(error)).await
    }

    async fn finish(
        &self,
        id: JobId,
        to: State,
        result: Option<&str>,
        error: Option<&str>,
    ) -> Result<bool> {
        validate_transition(State::Running, to)?;

        let rows_affected = sqlx::query(
            "UPDATE jobs SET state = ?1, result = ?2, error = ?3, finished_at = ?4
             WHERE id = ?5 AND state = 'running'",
        )
        .bind(to.as_str())
        .bind(result)
        .bind(error)
        .bind(Utc::now())
        .bind(id.0)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows_affected == 1 {
            record_transition(State::Running, to);
        }
        Ok(rows_affected == 1)
    }

    /// List jobs in a state, oldest first.
    pub async fn list_by_state(&self, state: State) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE state = ?1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(state.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(JobRow::try_into_job).collect()
    }

    /// Startup recovery: every `running` job goes back to `queued`.
    ///
    /// A job found running at startup was interrupted by a crash or restart.
    /// There is no partial progress, so it is retried from scratch.
    /// Must run once, before the dispatcher starts polling.
    pub async fn reset_running_to_queued(&self) -> Result<u64> {
        let recovered = sqlx::query(
            "UPDATE jobs SET state = 'queued', started_at = NULL WHERE state = 'running'",
        )
        .execute(self.pool())
        .await?
        .rows_affected();

        if recovered > 0 {
            metrics::recovered_jobs().add(recovered, &[]);
            metrics::job_state_transitions().add(
                recovered,
                &[
                    KeyValue::new("from", State::Running.as_str()),
                    KeyValue::new("to", State::Queued.as_str()),
                ],
            );
        }
        Ok(recovered)
    }

    // -----------------------------------------------------------------------
    // Dashboard queries
    // -----------------------------------------------------------------------

    /// Count jobs per state.
    pub async fn count_by_state(&self) -> Result<JobStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(self.pool())
                .await?;

        let mut stats = JobStats::default();
        for (state, count) in rows {
            stats.add(state.parse()?, count as u64);
        }
        Ok(stats)
    }

    /// Most recently created jobs, newest first.
    pub async fn recent_jobs(&self, limit: i64) -> Result<Vec<Job>> {
        self.list_jobs(None, None, limit).await
    }

    /// Most recently finished failed jobs, newest first.
    pub async fn failed_jobs(&self, limit: i64) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE state = 'failed'
             ORDER BY finished_at DESC, id DESC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(JobRow::try_into_job).collect()
    }

    /// List jobs, optionally filtered by state and submitter, newest first.
    pub async fn list_jobs(
        &self,
        state: Option<State>,
        submitter_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE (?1 IS NULL OR state = ?1)
             AND (?2 IS NULL OR submitter_id = ?2)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3"
        ))
        .bind(state.map(State::as_str))
        .bind(submitter_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(JobRow::try_into_job).collect()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    submitter_id: String,
    fingerprint: String,
    payload: String,
    state: String,
    result: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn try_into_job(self) -> Result<Job> {
        Ok(Job {
            id: JobId(self.id),
            submitter_id: self.submitter_id,
            fingerprint: self.fingerprint,
            payload: self.payload,
            state: self.state.parse()?,
            result: self.result,
            error: self.error,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        })
    }
}

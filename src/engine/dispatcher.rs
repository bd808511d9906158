//! Dispatcher: the single worker loop. Picks fairly, claims exclusively,
//! executes, retires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use opentelemetry::KeyValue;
use tokio::sync::{Notify, watch};
use tracing::{Instrument, error, info, warn};

use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::{JobId, State};
use crate::scheduler::{FairnessScheduler, FairnessSnapshot};
use crate::telemetry::job::{record_state_transition, start_job_span};
use crate::telemetry::metrics;

use super::executor::Executor;

/// Configuration for the dispatcher loop.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How long to idle when nothing is queued.
    pub poll_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// What one loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Nothing was queued.
    Idle,
    /// The selected job was claimed by someone else first, or was moved
    /// out of `running` before its outcome could be recorded.
    Conflict(JobId),
    /// The job ran and is now `done`.
    Done(JobId),
    /// The job ran and is now `failed`.
    Failed(JobId),
}

/// Cloneable handle for stopping a running dispatcher.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<Notify>,
}

impl ShutdownHandle {
    /// Signal the dispatcher to stop after the current job.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// The worker loop. Strictly sequential: never runs two jobs at once.
pub struct Dispatcher<E> {
    db: Db,
    executor: E,
    scheduler: FairnessScheduler,
    config: DispatcherConfig,
    shutdown: Arc<Notify>,
}

impl<E: Executor> Dispatcher<E> {
    pub fn new(db: Db, executor: E, config: DispatcherConfig) -> Self {
        Self {
            db,
            executor,
            scheduler: FairnessScheduler::new(),
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Read-only view of per-submitter `last_served_at`.
    pub fn fairness(&self) -> watch::Receiver<FairnessSnapshot> {
        self.scheduler.subscribe()
    }

    pub fn scheduler(&self) -> &FairnessScheduler {
        &self.scheduler
    }

    /// Run the loop until shutdown.
    ///
    /// Startup recovery must already have run; see `Intake::startup`.
    pub async fn run(mut self) -> Result<()> {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "dispatcher started"
        );

        loop {
            let idle = match self.process_next().await {
                Ok(Dispatch::Idle) => true,
                Ok(_) => false,
                Err(e) => {
                    error!("dispatch error: {e}");
                    true
                }
            };

            // A job in flight is never interrupted; shutdown is only
            // observed between iterations.
            let pause = if idle {
                self.config.poll_interval
            } else {
                Duration::ZERO
            };
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => {
                    info!("dispatcher shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Pick, claim, and execute at most one job.
    pub async fn process_next(&mut self) -> Result<Dispatch> {
        let queued = self.db.list_by_state(State::Queued).await?;

        let Some(job) = self.scheduler.next(&queued, Utc::now()) else {
            return Ok(Dispatch::Idle);
        };

        let span = start_job_span(&job.submitter_id, &job.id);

        async {
            let job = match self.db.claim(job.id).await {
                Ok(job) => job,
                Err(Error::TransitionConflict { id, .. }) => {
                    warn!(job_id = %id, "lost claim race, skipping");
                    metrics::transition_conflicts().add(1, &[]);
                    return Ok(Dispatch::Conflict(id));
                }
                Err(e) => return Err(e),
            };
            record_state_transition(&span, State::Queued, State::Running);
            info!(job_id = %job.id, submitter_id = %job.submitter_id, "job running");

            let start = Instant::now();
            let outcome = self.executor.execute(&job).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (to, retired) = match &outcome {
                Ok(result) => (State::Done, self.db.complete_job(job.id, result).await?),
                Err(e) => (State::Failed, self.db.fail_job(job.id, &e.to_string()).await?),
            };
            if !retired {
                warn!(job_id = %job.id, to = %to, "job left running during execution, outcome dropped");
                metrics::transition_conflicts().add(1, &[]);
                return Ok(Dispatch::Conflict(job.id));
            }
            record_state_transition(&span, State::Running, to);

            match outcome {
                Ok(_) => {
                    info!(job_id = %job.id, duration_ms, "job done");
                    metrics::job_duration_ms()
                        .record(duration_ms as f64, &[KeyValue::new("outcome", "done")]);
                    Ok(Dispatch::Done(job.id))
                }
                Err(e) => {
                    error!(job_id = %job.id, duration_ms, error = %e, "job failed");
                    metrics::execution_failures().add(1, &[]);
                    metrics::job_duration_ms()
                        .record(duration_ms as f64, &[KeyValue::new("outcome", "failed")]);
                    Ok(Dispatch::Failed(job.id))
                }
            }
        }
        .instrument(span.clone())
        .await
    }
}

//! Job execution: the dispatcher hands a running job to an [`Executor`]
//! and records whatever comes back.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::model::Job;

/// Why a job's execution failed. Recorded on the job; never retried.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to start: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("exited with status {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("{0}")]
    Failed(String),
}

/// Runs a job's work.
///
/// `Ok` carries the output stored as the job's `result`.
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, job: &Job) -> impl Future<Output = Result<String, ExecutionError>> + Send;
}

/// Sleeps for a fixed duration and succeeds.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    pub duration: Duration,
}

impl SimulatedExecutor {
    pub const OUTPUT: &'static str = "Job completed successfully";

    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Executor for SimulatedExecutor {
    async fn execute(&self, job: &Job) -> Result<String, ExecutionError> {
        debug!(job_id = %job.id, duration_ms = self.duration.as_millis() as u64, "simulating work");
        tokio::time::sleep(self.duration).await;
        Ok(Self::OUTPUT.to_string())
    }
}

/// Runs the payload as a shell command (`sh -c <payload>`).
///
/// Stdout becomes the result. A non-zero exit fails the job with stderr.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

impl Executor for ShellExecutor {
    async fn execute(&self, job: &Job) -> Result<String, ExecutionError> {
        debug!(job_id = %job.id, command = %job.payload, "running shell job");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&job.payload)
            .env("TICKETQ_JOB_ID", job.id.to_string())
            .env("TICKETQ_SUBMITTER_ID", &job.submitter_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
        } else {
            Err(ExecutionError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            })
        }
    }
}

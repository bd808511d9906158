//! Core data model.
//!
//! A job is one submission from one submitter. It has identity (id and
//! fingerprint), an opaque payload, and a lifecycle state. Everything the
//! dashboard shows is derived from these rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A unit of work tracked by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier, assigned at creation.
    pub id: JobId,

    /// Opaque identifier of the user who submitted the job.
    pub submitter_id: String,

    /// Content hash of (submitter_id, payload). Unique across all jobs.
    pub fingerprint: String,

    /// Data handed to the executor. The queue doesn't interpret it.
    pub payload: String,

    /// Current lifecycle state.
    pub state: State,

    /// Executor output, set when the job finishes successfully.
    pub result: Option<String>,

    /// Execution error, set when the job fails.
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Newtype for job IDs.
///
/// Backed by a UUIDv7, so IDs sort (roughly) in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(JobId)
            .map_err(|e| Error::Other(format!("invalid job id {s:?}: {e}")))
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Accepted, waiting for the dispatcher.
    Queued,
    /// Picked by the dispatcher, executing.
    Running,
    /// Finished successfully. Terminal.
    Done,
    /// Execution failed. Terminal, never retried.
    Failed,
}

impl State {
    pub const ALL: [State; 4] = [State::Queued, State::Running, State::Done, State::Failed];

    /// Can transition from self to `to`?
    ///
    /// Only forward edges. The `running -> queued` recovery edge is not
    /// part of the graph; it is applied by `Db::reset_running_to_queued`
    /// at startup and nowhere else.
    pub fn can_transition_to(self, to: State) -> bool {
        use State::*;
        matches!(
            (self, to),
            (Queued, Running) | (Running, Done) | (Running, Failed)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Done | State::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Queued => "queued",
            State::Running => "running",
            State::Done => "done",
            State::Failed => "failed",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for State {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(State::Queued),
            "running" => Ok(State::Running),
            "done" => Ok(State::Done),
            "failed" => Ok(State::Failed),
            _ => Err(Error::Other(format!("unknown state: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// New job
// ---------------------------------------------------------------------------

/// Everything the store needs to insert a job. Always inserted as `queued`.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub submitter_id: String,
    pub fingerprint: String,
    pub payload: String,
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

/// Job counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub total: u64,
    pub queued: u64,
    pub running: u64,
    pub done: u64,
    pub failed: u64,
}

impl JobStats {
    pub(crate) fn add(&mut self, state: State, count: u64) {
        match state {
            State::Queued => self.queued += count,
            State::Running => self.running += count,
            State::Done => self.done += count,
            State::Failed => self.failed += count,
        }
        self.total += count;
    }
}

/// Read-only aggregate view over the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub stats: JobStats,
    /// Most recently created jobs, newest first.
    pub recent: Vec<Job>,
    /// Most recently finished failed jobs, newest first.
    pub failed: Vec<Job>,
}

//! Fairness-aware job selection.
//!
//! Plain FIFO lets one submitter with a deep backlog monopolize the single
//! worker. Instead, the scheduler remembers when each submitter was last
//! served and always picks from the least recently served one. Submitters
//! never served at all go first. Within a submitter, jobs keep their
//! arrival order.
//!
//! This is fairness-weighted, not FIFO: across submitters, a later job can
//! run before an earlier one.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

use crate::model::Job;

/// `last_served_at` per submitter, as published to outside readers.
pub type FairnessSnapshot = Arc<HashMap<String, DateTime<Utc>>>;

/// Picks the next job to run. Owned by the dispatcher.
#[derive(Debug)]
pub struct FairnessScheduler {
    last_served: HashMap<String, DateTime<Utc>>,
    published: watch::Sender<FairnessSnapshot>,
}

impl Default for FairnessScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FairnessScheduler {
    pub fn new() -> Self {
        let (published, _) = watch::channel(FairnessSnapshot::default());
        Self {
            last_served: HashMap::new(),
            published,
        }
    }

    /// Select the next job and mark its submitter served at `now`.
    pub fn next(&mut self, queued: &[Job], now: DateTime<Utc>) -> Option<Job> {
        let job = self.select(queued)?.clone();
        self.mark_served(&job.submitter_id, now);
        debug!(job_id = %job.id, submitter_id = %job.submitter_id, "selected");
        Some(job)
    }

    /// The job [`next`](Self::next) would pick, without recording anything.
    ///
    /// Ordered by the submitter's `last_served_at` (never served counts as
    /// oldest), then `created_at`, then id.
    pub fn select<'a>(&self, queued: &'a [Job]) -> Option<&'a Job> {
        queued.iter().min_by(|a, b| {
            let a_served = self.last_served_at(&a.submitter_id);
            let b_served = self.last_served_at(&b.submitter_id);
            // None < Some(_), which is exactly "never served goes first".
            a_served
                .cmp(&b_served)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        })
    }

    /// Record that `submitter_id` had a job picked at `at`.
    pub fn mark_served(&mut self, submitter_id: &str, at: DateTime<Utc>) {
        self.last_served.insert(submitter_id.to_string(), at);
        self.published
            .send_replace(Arc::new(self.last_served.clone()));
    }

    pub fn last_served_at(&self, submitter_id: &str) -> Option<DateTime<Utc>> {
        self.last_served.get(submitter_id).copied()
    }

    /// Watch the fairness records without touching the scheduler.
    pub fn subscribe(&self) -> watch::Receiver<FairnessSnapshot> {
        self.published.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobId, State};
    use chrono::Duration;

    fn job(submitter: &str, created_at: DateTime<Utc>) -> Job {
        Job {
            id: JobId::new(),
            submitter_id: submitter.to_string(),
            fingerprint: format!("{submitter}-{created_at}"),
            payload: String::new(),
            state: State::Queued,
            result: None,
            error: None,
            created_at,
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn empty_queue_selects_nothing() {
        let mut scheduler = FairnessScheduler::new();
        assert!(scheduler.next(&[], Utc::now()).is_none());
    }

    #[test]
    fn never_served_beats_served_even_when_younger() {
        let t0 = Utc::now();
        let mut scheduler = FairnessScheduler::new();
        scheduler.mark_served("alice", t0 - Duration::hours(24));

        let jobs = vec![job("alice", t0), job("bob", t0 + Duration::seconds(5))];
        assert_eq!(scheduler.select(&jobs).unwrap().submitter_id, "bob");
    }

    #[test]
    fn equal_priority_falls_back_to_created_at_then_id() {
        let t0 = Utc::now();
        let scheduler = FairnessScheduler::new();

        let early = job("bob", t0);
        let late = job("alice", t0 + Duration::milliseconds(1));
        let jobs = vec![late, early.clone()];
        assert_eq!(scheduler.select(&jobs).unwrap().id, early.id);

        let mut a = job("alice", t0);
        let mut b = job("bob", t0);
        a.id = JobId(uuid::Uuid::from_u128(2));
        b.id = JobId(uuid::Uuid::from_u128(1));
        assert_eq!(scheduler.select(&[a, b.clone()]).unwrap().id, b.id);
    }

    #[test]
    fn select_does_not_record() {
        let t0 = Utc::now();
        let scheduler = FairnessScheduler::new();
        let jobs = vec![job("alice", t0)];
        let _ = scheduler.select(&jobs);
        assert!(scheduler.last_served_at("alice").is_none());
    }

    #[test]
    fn subscribers_see_pick_time_updates() {
        let t0 = Utc::now();
        let mut scheduler = FairnessScheduler::new();
        let rx = scheduler.subscribe();

        scheduler.next(&[job("alice", t0)], t0 + Duration::seconds(1));
        assert_eq!(
            rx.borrow().get("alice").copied(),
            Some(t0 + Duration::seconds(1))
        );
    }
}

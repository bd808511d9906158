//! Submission dedup by content fingerprint.
//!
//! A retried submission (same submitter, same payload) resolves to the job
//! the first attempt created, whatever state that job is in now. The
//! fingerprint's UNIQUE constraint in the store is what makes this hold
//! under concurrent identical submissions; this module only has to turn
//! the losing insert back into a read.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::{Job, NewJob};

/// Hex SHA-256 of `(submitter_id, payload)`.
///
/// The submitter id is length-prefixed, so `("ab", "c")` and `("a", "bc")`
/// hash differently.
pub fn fingerprint(submitter_id: &str, payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update((submitter_id.len() as u64).to_be_bytes());
    hasher.update(submitter_id.as_bytes());
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Maps fingerprints to jobs, creating the job on first sight.
#[derive(Debug, Clone)]
pub struct IdempotencyIndex {
    db: Db,
}

impl IdempotencyIndex {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Return the job for `(submitter_id, payload)`, creating it if absent.
    ///
    /// The flag is `true` iff this call created the job.
    pub async fn resolve(&self, submitter_id: &str, payload: &str) -> Result<(Job, bool)> {
        let fingerprint = fingerprint(submitter_id, payload);

        if let Some(existing) = self.db.find_by_fingerprint(&fingerprint).await? {
            debug!(job_id = %existing.id, state = %existing.state, "dedup hit");
            return Ok((existing, false));
        }

        self.insert_or_reread(NewJob {
            submitter_id: submitter_id.to_string(),
            fingerprint,
            payload: payload.to_string(),
        })
        .await
    }

    /// Insert `new`; if a concurrent submission got there first, return
    /// that job instead.
    async fn insert_or_reread(&self, new: NewJob) -> Result<(Job, bool)> {
        let fingerprint = new.fingerprint.clone();
        let created = self.db.create_job(new).await;

        match created {
            Ok(job) => Ok((job, true)),
            Err(Error::DuplicateFingerprint(_)) => {
                // Lost the insert race to a concurrent identical submission.
                let existing = self
                    .db
                    .find_by_fingerprint(&fingerprint)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("job with fingerprint {fingerprint}")))?;
                debug!(job_id = %existing.id, "dedup hit after insert race");
                Ok((existing, false))
            }
            Err(e) => Err(e),
        }
    }
}

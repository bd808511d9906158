//! Burst submissions against tight limits.

use std::collections::HashSet;

use ticketq::config::RateLimitConfig;
use ticketq::db::Db;
use ticketq::engine::Intake;
use ticketq::error::Error;
use ticketq::limiter::{RateLimiter, Scope};

#[tokio::test]
async fn burst_admits_exactly_the_global_limit() {
    let db = Db::in_memory().await.unwrap();
    let limiter = RateLimiter::new(RateLimitConfig::new(60, 5, 2).unwrap()).unwrap();
    let intake = Intake::new(db.clone(), limiter);

    let mut handles = Vec::new();
    for i in 0..100 {
        let intake = intake.clone();
        handles.push(tokio::spawn(async move {
            intake
                .submit(&format!("user-{}", i % 10), &format!("payload {i}"))
                .await
        }));
    }

    let mut accepted = HashSet::new();
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(submission) => {
                assert!(submission.is_new);
                accepted.insert(submission.job.id);
            }
            Err(Error::RateLimitExceeded { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(accepted.len(), 5);
    assert_eq!(rejected, 95);
    assert_eq!(db.count_by_state().await.unwrap().queued, 5);
    let snapshot = intake.limiter().snapshot().await;
    assert_eq!(snapshot.global_count, 5);
    assert_eq!(snapshot.tracked_submitters, 10);

    let err = intake.submit("newcomer", "late").await.unwrap_err();
    assert!(matches!(
        err,
        Error::RateLimitExceeded {
            scope: Scope::Global
        }
    ));
    assert_eq!(intake.limiter().snapshot().await.tracked_submitters, 11);
}

#[tokio::test]
async fn one_noisy_submitter_cannot_starve_the_rest() {
    let db = Db::in_memory().await.unwrap();
    let limiter = RateLimiter::new(RateLimitConfig::new(60, 10, 3).unwrap()).unwrap();
    let intake = Intake::new(db, limiter);

    for i in 0..50 {
        let _ = intake.submit("noisy", &format!("spam {i}")).await;
    }
    assert_eq!(intake.limiter().snapshot().await.global_count, 3);

    for i in 0..7 {
        intake
            .submit(&format!("quiet-{i}"), "hello")
            .await
            .unwrap();
    }
    assert_eq!(intake.limiter().snapshot().await.global_count, 10);
}

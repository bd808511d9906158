//! Fixed-window behavior of the rate limiter, driven by tokio's paused clock.

use std::sync::Arc;
use std::time::Duration;

use ticketq::config::RateLimitConfig;
use ticketq::limiter::{Admission, RateLimiter, Scope};

fn limiter(window_seconds: u64, global: u32, per_user: u32) -> RateLimiter {
    RateLimiter::new(RateLimitConfig::new(window_seconds, global, per_user).unwrap()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn per_user_limit_rejects_then_resets_after_window() {
    let limiter = limiter(60, 100, 2);

    assert_eq!(limiter.admit("alice").await, Admission::Allowed);
    assert_eq!(limiter.admit("alice").await, Admission::Allowed);
    assert_eq!(
        limiter.admit("alice").await,
        Admission::Rejected(Scope::PerUser)
    );

    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(
        limiter.admit("alice").await,
        Admission::Rejected(Scope::PerUser)
    );

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(limiter.admit("alice").await, Admission::Allowed);
}

#[tokio::test(start_paused = true)]
async fn submitters_have_independent_budgets() {
    let limiter = limiter(60, 100, 1);

    assert!(limiter.admit("alice").await.is_allowed());
    assert_eq!(
        limiter.admit("alice").await,
        Admission::Rejected(Scope::PerUser)
    );
    assert!(limiter.admit("bob").await.is_allowed());
    assert!(limiter.admit("carol").await.is_allowed());
}

#[tokio::test(start_paused = true)]
async fn global_limit_applies_across_submitters_and_resets() {
    let limiter = limiter(10, 3, 5);

    for submitter in ["a", "b", "c"] {
        assert!(limiter.admit(submitter).await.is_allowed());
    }
    assert_eq!(limiter.admit("d").await, Admission::Rejected(Scope::Global));
    assert_eq!(limiter.snapshot().await.global_count, 3);

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(limiter.snapshot().await.global_count, 0);
    assert!(limiter.admit("d").await.is_allowed());
}

#[tokio::test(start_paused = true)]
async fn windows_are_tracked_per_counter() {
    let limiter = limiter(60, 100, 1);

    assert!(limiter.admit("alice").await.is_allowed());
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(limiter.admit("bob").await.is_allowed());

    // alice's window started 60s ago, bob's only 30s ago.
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(limiter.admit("alice").await.is_allowed());
    assert_eq!(
        limiter.admit("bob").await,
        Admission::Rejected(Scope::PerUser)
    );
}

#[tokio::test]
async fn concurrent_admissions_never_exceed_the_global_limit() {
    let limiter = Arc::new(limiter(60, 7, 100));

    let mut handles = Vec::new();
    for i in 0..50 {
        let limiter = Arc::clone(&limiter);
        handles.push(tokio::spawn(async move {
            limiter.admit(&format!("user-{}", i % 5)).await
        }));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap().is_allowed() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 7);
}

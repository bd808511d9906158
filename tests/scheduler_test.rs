//! Fairness of the dispatcher's job selection against a real store.

use std::time::Duration;

use ticketq::config::RateLimitConfig;
use ticketq::db::Db;
use ticketq::engine::{Dispatch, Dispatcher, DispatcherConfig, Intake, SimulatedExecutor};
use ticketq::limiter::RateLimiter;
use ticketq::model::JobId;

async fn setup() -> (Intake, Dispatcher<SimulatedExecutor>) {
    let db = Db::in_memory().await.unwrap();
    let limiter = RateLimiter::new(RateLimitConfig::new(60, 100, 100).unwrap()).unwrap();
    let intake = Intake::new(db, limiter);
    // A short run keeps consecutive pick times distinct.
    let dispatcher = intake
        .startup(
            SimulatedExecutor::new(Duration::from_millis(5)),
            DispatcherConfig::default(),
        )
        .await
        .unwrap();
    (intake, dispatcher)
}

async fn drain(dispatcher: &mut Dispatcher<SimulatedExecutor>) -> Vec<JobId> {
    let mut order = Vec::new();
    loop {
        match dispatcher.process_next().await.unwrap() {
            Dispatch::Done(id) => order.push(id),
            Dispatch::Idle => return order,
            other => panic!("unexpected dispatch: {other:?}"),
        }
    }
}

#[tokio::test]
async fn single_new_job_runs_before_a_backlog() {
    let (intake, mut dispatcher) = setup().await;

    let a1 = intake.submit("a", "a1").await.unwrap().job.id;
    let b1 = intake.submit("b", "b1").await.unwrap().job.id;
    let a2 = intake.submit("a", "a2").await.unwrap().job.id;
    let a3 = intake.submit("a", "a3").await.unwrap().job.id;
    let a4 = intake.submit("a", "a4").await.unwrap().job.id;
    let a5 = intake.submit("a", "a5").await.unwrap().job.id;

    assert_eq!(drain(&mut dispatcher).await, vec![a1, b1, a2, a3, a4, a5]);
}

#[tokio::test]
async fn submitters_alternate_regardless_of_arrival_order() {
    let (intake, mut dispatcher) = setup().await;

    let a1 = intake.submit("a", "a1").await.unwrap().job.id;
    let a2 = intake.submit("a", "a2").await.unwrap().job.id;
    let a3 = intake.submit("a", "a3").await.unwrap().job.id;
    let b1 = intake.submit("b", "b1").await.unwrap().job.id;
    let b2 = intake.submit("b", "b2").await.unwrap().job.id;

    assert_eq!(drain(&mut dispatcher).await, vec![a1, b1, a2, b2, a3]);
}

#[tokio::test]
async fn late_arriving_submitter_is_served_next() {
    let (intake, mut dispatcher) = setup().await;

    let a1 = intake.submit("a", "a1").await.unwrap().job.id;
    let a2 = intake.submit("a", "a2").await.unwrap().job.id;
    assert_eq!(dispatcher.process_next().await.unwrap(), Dispatch::Done(a1));

    let c1 = intake.submit("c", "c1").await.unwrap().job.id;
    assert_eq!(drain(&mut dispatcher).await, vec![c1, a2]);
}

#[tokio::test]
async fn fairness_records_are_published_at_pick_time() {
    let (intake, mut dispatcher) = setup().await;
    let fairness = dispatcher.fairness();

    assert!(fairness.borrow().is_empty());
    intake.submit("alice", "job").await.unwrap();
    dispatcher.process_next().await.unwrap();

    let served = fairness.borrow().get("alice").copied();
    assert!(served.is_some());
    assert_eq!(dispatcher.scheduler().last_served_at("alice"), served);
}

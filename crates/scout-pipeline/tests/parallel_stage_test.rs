//! Integration tests for ParallelStage
//!
//! These tests verify that the four analysis tasks really run concurrently
//! and that a failing or slow task never takes its siblings down with it.

mod common;

use common::{MockTask, Mocks, StartLog, fields};
use scout_pipeline::{Dimension, ErrorCategory, ParallelStage, SessionManager};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn session() -> Arc<scout_pipeline::Session> {
    Arc::new(SessionManager::new("test", Duration::from_secs(60)).create_session("tester"))
}

fn request() -> Arc<scout_pipeline::AnalysisRequest> {
    Arc::new(fields().validate().unwrap())
}

#[tokio::test]
async fn test_tasks_start_together_and_overlap() {
    let log: StartLog = Arc::new(Mutex::new(Vec::new()));
    let mocks = Mocks::scored().map(|t| {
        t.with_delay(Duration::from_millis(200))
            .with_log(log.clone())
    });
    let stage = ParallelStage::new(mocks.task_set());

    let start = Instant::now();
    let outcome = stage
        .run(request(), session(), Duration::from_secs(5))
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(outcome.results.len(), 4);
    // Sequential execution would take at least 800ms.
    assert!(
        elapsed < Duration::from_millis(600),
        "tasks did not overlap: {:?}",
        elapsed
    );

    let starts = log.lock().unwrap();
    assert_eq!(starts.len(), 4);
    let first = starts.iter().map(|(_, t)| *t).min().unwrap();
    let last = starts.iter().map(|(_, t)| *t).max().unwrap();
    assert!(last.duration_since(first) < Duration::from_millis(100));
}

#[tokio::test]
async fn test_fast_failure_does_not_cancel_slow_siblings() {
    let mut mocks = Mocks::scored().map(|t| t.with_delay(Duration::from_millis(150)));
    mocks.trend = MockTask::failing(Dimension::Trend).with_delay(Duration::from_millis(1));
    let stage = ParallelStage::new(mocks.task_set());

    let outcome = stage
        .run(request(), session(), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(outcome.failed_dimensions(), [Dimension::Trend]);
    let succeeded: Vec<Dimension> = outcome.results.iter().map(|r| r.dimension).collect();
    assert_eq!(
        succeeded,
        [Dimension::Market, Dimension::Competition, Dimension::Profit]
    );
}

#[tokio::test]
async fn test_stage_timeout_bounds_the_join() {
    let mut mocks = Mocks::scored();
    mocks.market = mocks.market.hanging_first(1, Duration::from_secs(30));
    mocks.profit = mocks.profit.hanging_first(1, Duration::from_secs(30));
    let stage = ParallelStage::new(mocks.task_set());

    let start = Instant::now();
    let outcome = stage
        .run(request(), session(), Duration::from_millis(150))
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(
        outcome.failed_dimensions(),
        [Dimension::Market, Dimension::Profit]
    );
    for failure in &outcome.failures {
        assert_eq!(failure.error.category, ErrorCategory::Timeout);
    }
    assert_eq!(outcome.results.len(), 2);
}

#[tokio::test]
async fn test_total_failure_cites_first_declared_task() {
    let mut mocks = Mocks::all_failing();
    mocks.trend = mocks.trend.with_delay(Duration::from_millis(100));
    let stage = ParallelStage::new(mocks.task_set());

    let err = stage
        .run(request(), session(), Duration::from_secs(5))
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::AgentFailure);
    assert_eq!(err.agent_name.as_deref(), Some("trend"));
    assert_eq!(mocks.total_calls(), 4);
}

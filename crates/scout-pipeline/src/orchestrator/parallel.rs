//! The fan-out/join stage that runs the four analysis tasks.
//!
//! All tasks are spawned before any is awaited, so they start together and
//! run concurrently. Each task's outcome is captured on its own: a failure,
//! a panic or a timeout in one task never cancels its siblings. The join has
//! a single deadline for the whole stage; a task still running when it
//! passes is recorded as timed out and its handle is detached (the task is
//! not killed, its result is simply never read).

use crate::agent::{AgentError, AnalysisResult, Dimension, TaskSet};
use crate::error::{ErrorCategory, ErrorContext};
use crate::orchestrator::state::Phase;
use crate::request::AnalysisRequest;
use crate::session::Session;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

/// Upper bound on the stage deadline when the configured timeout cannot be
/// added to the current instant.
const MAX_STAGE_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// One task that did not produce a usable result.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub dimension: Dimension,
    pub error: ErrorContext,
}

/// What the stage produced when at least one task succeeded.
#[derive(Debug, Clone, Default)]
pub struct StageOutcome {
    /// Successful results, in declaration order.
    pub results: Vec<AnalysisResult>,
    /// Failed tasks, in declaration order.
    pub failures: Vec<TaskFailure>,
}

impl StageOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_dimensions(&self) -> Vec<Dimension> {
        self.failures.iter().map(|f| f.dimension).collect()
    }

    /// The error reported when no task succeeded, or `None` if one did.
    ///
    /// If every task timed out the stage as a whole timed out and the error is
    /// `TIMEOUT`, so the phase can be retried. Otherwise it is
    /// `AGENT_FAILURE`, citing the first failure in declaration order.
    pub fn total_failure(&self) -> Option<ErrorContext> {
        if !self.results.is_empty() {
            return None;
        }
        let first = self.failures.first()?;
        let count = self.failures.len();

        let all_timed_out = self
            .failures
            .iter()
            .all(|f| f.error.category == ErrorCategory::Timeout);

        let mut error = if all_timed_out {
            ErrorContext::timeout(
                Phase::Parallel,
                format!("All {} analysis tasks timed out", count),
            )
        } else {
            ErrorContext::agent_failure(
                Phase::Parallel,
                format!(
                    "All {} analysis tasks failed; first failure: {}",
                    count, first.error.message
                ),
            )
        };
        if let Some(detail) = &first.error.technical_detail {
            error = error.with_detail(detail.clone());
        }
        Some(error.with_agent(first.dimension.as_str()))
    }
}

/// Runs one [`TaskSet`] concurrently against a request.
#[derive(Debug, Clone)]
pub struct ParallelStage {
    tasks: TaskSet,
}

impl ParallelStage {
    pub fn new(tasks: TaskSet) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &TaskSet {
        &self.tasks
    }

    /// Runs all four tasks and joins them against a shared deadline.
    ///
    /// Succeeds if at least one task produced a valid result. On total
    /// failure returns the error described by [`StageOutcome::total_failure`].
    pub async fn run(
        &self,
        request: Arc<AnalysisRequest>,
        session: Arc<Session>,
        timeout: Duration,
    ) -> Result<StageOutcome, ErrorContext> {
        let started = Instant::now();
        let deadline = started
            .checked_add(timeout)
            .unwrap_or_else(|| started + MAX_STAGE_TIMEOUT);

        info!(
            category = %request.category(),
            timeout = ?timeout,
            "Launching analysis tasks"
        );

        let handles: Vec<(Dimension, String, JoinHandle<Result<AnalysisResult, AgentError>>)> =
            self.tasks
                .iter()
                .map(|(dimension, task)| {
                    let task = Arc::clone(task);
                    let name = task.name();
                    let request = Arc::clone(&request);
                    let session = Arc::clone(&session);

                    let span = info_span!(
                        "analysis_task",
                        dimension = %dimension,
                        task = %name,
                    );

                    let handle = tokio::spawn(
                        async move {
                            debug!("Analysis task started");
                            task.execute(&request, &session).await
                        }
                        .instrument(span),
                    );
                    (dimension, name, handle)
                })
                .collect();

        let mut outcome = StageOutcome::default();

        for (dimension, name, handle) in handles {
            let joined = tokio::time::timeout_at(deadline, handle).await;

            let result = match joined {
                Ok(Ok(Ok(result))) => result.validate_for(dimension).map(|()| result),
                Ok(Ok(Err(e))) => Err(e),
                Ok(Err(join_error)) => Err(AgentError::Aborted(join_error.to_string())),
                Err(_) => Err(AgentError::Timeout { timeout }),
            };

            match result {
                Ok(result) => {
                    debug!(
                        dimension = %dimension,
                        score = result.score,
                        elapsed = ?started.elapsed(),
                        "Analysis task completed"
                    );
                    outcome.results.push(result);
                }
                Err(e) => {
                    warn!(
                        dimension = %dimension,
                        task = %name,
                        error = %e,
                        "Analysis task failed"
                    );
                    outcome.failures.push(TaskFailure {
                        dimension,
                        error: e.into_context(Phase::Parallel, &name),
                    });
                }
            }
        }

        if let Some(error) = outcome.total_failure() {
            warn!(error = %error, "Every analysis task failed");
            return Err(error);
        }

        info!(
            succeeded = outcome.results.len(),
            failed = outcome.failures.len(),
            elapsed = ?started.elapsed(),
            "Analysis tasks joined"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AnalysisTask;
    use crate::request::RequestFields;
    use crate::session::SessionManager;
    use async_trait::async_trait;

    enum Behavior {
        Score(u8),
        Fail,
        Sleep(Duration),
        Panic,
        WrongDimension,
    }

    struct ScriptedTask {
        dimension: Dimension,
        behavior: Behavior,
    }

    #[async_trait]
    impl AnalysisTask for ScriptedTask {
        fn dimension(&self) -> Dimension {
            self.dimension
        }

        async fn execute(
            &self,
            _request: &AnalysisRequest,
            _session: &Session,
        ) -> Result<AnalysisResult, AgentError> {
            match &self.behavior {
                Behavior::Score(score) => Ok(AnalysisResult::new(self.dimension, *score, "ok")),
                Behavior::Fail => Err(AgentError::ExecutionFailed(format!(
                    "{} backend error",
                    self.dimension
                ))),
                Behavior::Sleep(delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(AnalysisResult::new(self.dimension, 50, "late"))
                }
                Behavior::Panic => panic!("task bug"),
                Behavior::WrongDimension => {
                    Ok(AnalysisResult::new(Dimension::Trend, 50, "misrouted"))
                }
            }
        }
    }

    fn stage(behaviors: [Behavior; 4]) -> ParallelStage {
        let [trend, market, competition, profit] = behaviors;
        let make = |dimension, behavior| -> crate::agent::SharedTask {
            Arc::new(ScriptedTask {
                dimension,
                behavior,
            })
        };
        ParallelStage::new(
            TaskSet::new(
                make(Dimension::Trend, trend),
                make(Dimension::Market, market),
                make(Dimension::Competition, competition),
                make(Dimension::Profit, profit),
            )
            .unwrap(),
        )
    }

    fn inputs() -> (Arc<AnalysisRequest>, Arc<Session>) {
        let request = RequestFields::new("phone case", "US", "fba", "low")
            .validate()
            .unwrap();
        let session = SessionManager::new("test", Duration::from_secs(60)).create_session("u");
        (Arc::new(request), Arc::new(session))
    }

    #[tokio::test]
    async fn test_all_tasks_succeed() {
        let (request, session) = inputs();
        let outcome = stage([
            Behavior::Score(80),
            Behavior::Score(70),
            Behavior::Score(60),
            Behavior::Score(90),
        ])
        .run(request, session, Duration::from_secs(5))
        .await
        .unwrap();

        assert!(outcome.is_complete());
        let dims: Vec<Dimension> = outcome.results.iter().map(|r| r.dimension).collect();
        assert_eq!(dims, Dimension::ALL);
    }

    #[tokio::test]
    async fn test_one_failure_is_isolated() {
        let (request, session) = inputs();
        let outcome = stage([
            Behavior::Score(80),
            Behavior::Score(70),
            Behavior::Fail,
            Behavior::Score(90),
        ])
        .run(request, session, Duration::from_secs(5))
        .await
        .unwrap();

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.failed_dimensions(), [Dimension::Competition]);
        let failure = &outcome.failures[0].error;
        assert_eq!(failure.category, ErrorCategory::AgentFailure);
        assert_eq!(failure.agent_name.as_deref(), Some("competition"));
    }

    #[tokio::test]
    async fn test_panicking_task_becomes_agent_failure() {
        let (request, session) = inputs();
        let outcome = stage([
            Behavior::Panic,
            Behavior::Score(70),
            Behavior::Score(60),
            Behavior::Score(90),
        ])
        .run(request, session, Duration::from_secs(5))
        .await
        .unwrap();

        assert_eq!(outcome.failed_dimensions(), [Dimension::Trend]);
        assert_eq!(
            outcome.failures[0].error.category,
            ErrorCategory::AgentFailure
        );
    }

    #[tokio::test]
    async fn test_malformed_result_is_rejected() {
        let (request, session) = inputs();
        let outcome = stage([
            Behavior::Score(80),
            Behavior::WrongDimension,
            Behavior::Score(101),
            Behavior::Score(90),
        ])
        .run(request, session, Duration::from_secs(5))
        .await
        .unwrap();

        assert_eq!(
            outcome.failed_dimensions(),
            [Dimension::Market, Dimension::Competition]
        );
    }

    #[tokio::test]
    async fn test_all_failures_report_first_in_declaration_order() {
        let (request, session) = inputs();
        let err = stage([Behavior::Fail, Behavior::Fail, Behavior::Fail, Behavior::Fail])
            .run(request, session, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert_eq!(err.category, ErrorCategory::AgentFailure);
        assert_eq!(err.phase, Phase::Parallel);
        assert_eq!(err.agent_name.as_deref(), Some("trend"));
        assert!(
            err.technical_detail
                .as_deref()
                .is_some_and(|d| d.contains("trend backend error"))
        );
    }

    #[tokio::test]
    async fn test_slow_task_times_out_others_keep_results() {
        let (request, session) = inputs();
        let outcome = stage([
            Behavior::Score(80),
            Behavior::Sleep(Duration::from_secs(10)),
            Behavior::Score(60),
            Behavior::Score(90),
        ])
        .run(request, session, Duration::from_millis(100))
        .await
        .unwrap();

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.failed_dimensions(), [Dimension::Market]);
        assert_eq!(outcome.failures[0].error.category, ErrorCategory::Timeout);
    }

    #[tokio::test]
    async fn test_all_timed_out_is_a_timeout() {
        let (request, session) = inputs();
        let slow = || Behavior::Sleep(Duration::from_secs(10));
        let err = stage([slow(), slow(), slow(), slow()])
            .run(request, session, Duration::from_millis(50))
            .await
            .unwrap_err();

        assert_eq!(err.category, ErrorCategory::Timeout);
        assert_eq!(err.phase, Phase::Parallel);
    }

    #[tokio::test]
    async fn test_mixed_total_failure_is_agent_failure() {
        let (request, session) = inputs();
        let err = stage([
            Behavior::Sleep(Duration::from_secs(10)),
            Behavior::Fail,
            Behavior::Fail,
            Behavior::Fail,
        ])
        .run(request, session, Duration::from_millis(50))
        .await
        .unwrap_err();

        assert_eq!(err.category, ErrorCategory::AgentFailure);
        assert_eq!(err.agent_name.as_deref(), Some("trend"));
    }
}

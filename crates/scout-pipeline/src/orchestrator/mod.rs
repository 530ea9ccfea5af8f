//! Pipeline orchestrator - sequences the analysis phases of one run.
//!
//! The orchestrator owns the phase state machine (see [`state`]) and drives a
//! run through it:
//!
//! 1. **Parallel**: the four analysis tasks run concurrently ([`parallel`]).
//!    The phase succeeds if at least one task succeeds, and is retried when
//!    it times out.
//! 2. **Evaluation**: the [`Evaluator`] combines whatever partial results
//!    exist into a weighted opportunity score.
//! 3. **Report**: a [`Reporter`] renders the final narrative.
//!
//! It is logically single-threaded: one phase at a time, with the only
//! fan-out inside the parallel phase. State is read only after the join.
//!
//! # Example
//!
//! ```rust,ignore
//! use scout_pipeline::orchestrator::{PhasePolicy, PipelineOrchestrator};
//! use scout_pipeline::progress::ProgressEmitter;
//!
//! let orchestrator = PipelineOrchestrator::new(tasks);
//! let result = orchestrator
//!     .execute(request, &session, &PhasePolicy::default(), &ProgressEmitter::disabled())
//!     .await?;
//!
//! println!("{}", result.state.report_text().unwrap_or_default());
//! ```

pub mod parallel;
pub mod state;

pub use parallel::{ParallelStage, StageOutcome, TaskFailure};
pub use state::{AnalysisState, Phase, PhaseTimes};

use crate::agent::TaskSet;
use crate::config::PipelineConfig;
use crate::error::ErrorContext;
use crate::evaluator::{EvaluationError, EvaluationResult, Evaluator, Recommendation};
use crate::progress::ProgressEmitter;
use crate::report::{NarrativeReporter, ReportError, Reporter};
use crate::request::AnalysisRequest;
use crate::retry::retry_on_timeout;
use crate::session::Session;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Timeout and retry limits applied to each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhasePolicy {
    /// Time budget for the parallel phase as a whole.
    pub timeout: Duration,
    /// Additional attempts after a timed-out phase.
    pub max_retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl PhasePolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

impl Default for PhasePolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// The outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub session_id: String,
    pub state: AnalysisState,
    /// Wall-clock time of the whole run, retries included.
    pub execution_time: Duration,
    pub phase_times: PhaseTimes,
}

impl PipelineResult {
    pub fn evaluation(&self) -> Option<&EvaluationResult> {
        self.state.evaluation_result()
    }

    pub fn opportunity_score(&self) -> Option<u8> {
        self.evaluation().map(|e| e.opportunity_score)
    }

    pub fn recommendation(&self) -> Option<Recommendation> {
        self.evaluation().map(|e| e.recommendation)
    }

    /// The narrative report, in Markdown.
    pub fn report_text(&self) -> Option<&str> {
        self.state.report_text()
    }

    /// The whole result as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// A one-line summary, e.g.
    /// `Category: desk lamp | Score: 76/100 | Recommendation: STRONG | Confidence: 100%`.
    pub fn to_summary(&self) -> String {
        let mut parts = vec![format!("Category: {}", self.state.request().category())];
        if let Some(evaluation) = self.evaluation() {
            parts.push(format!("Score: {}/100", evaluation.opportunity_score));
            parts.push(format!(
                "Recommendation: {}",
                evaluation.recommendation.as_str().to_uppercase()
            ));
            parts.push(format!(
                "Confidence: {:.0}%",
                evaluation.confidence * 100.0
            ));
        }
        parts.join(" | ")
    }
}

/// Sequences parallel stage, evaluator and reporter for one request.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    stage: ParallelStage,
    evaluator: Evaluator,
    reporter: Arc<dyn Reporter>,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator with the default weights and the narrative reporter.
    pub fn new(tasks: TaskSet) -> Self {
        Self {
            stage: ParallelStage::new(tasks),
            evaluator: Evaluator::default(),
            reporter: Arc::new(NarrativeReporter::new()),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn stage(&self) -> &ParallelStage {
        &self.stage
    }

    /// Runs one request through every phase.
    ///
    /// Returns exactly one of a [`PipelineResult`] or an [`ErrorContext`].
    /// On failure the state is moved to [`Phase::Failed`] and no further
    /// phase timing is recorded.
    pub async fn execute(
        &self,
        request: AnalysisRequest,
        session: &Session,
        policy: &PhasePolicy,
        progress: &ProgressEmitter,
    ) -> Result<PipelineResult, ErrorContext> {
        let started = Instant::now();
        let mut state = AnalysisState::new(request);
        let mut phase_times = PhaseTimes::new();

        progress.phase_entered(Phase::Pending);

        match self
            .run_phases(&mut state, &mut phase_times, session, policy, progress)
            .await
        {
            Ok(()) => {
                let execution_time = started.elapsed();
                info!(
                    session_id = %session.session_id,
                    execution_time = ?execution_time,
                    score = state.evaluation_result().map(|e| e.opportunity_score),
                    "Pipeline completed"
                );
                Ok(PipelineResult {
                    session_id: session.session_id.clone(),
                    state,
                    execution_time,
                    phase_times,
                })
            }
            Err(error) => {
                warn!(
                    session_id = %session.session_id,
                    phase = %error.phase,
                    category = %error.category,
                    "Pipeline failed: {}",
                    error.message
                );
                state.fail(error.message.clone());
                progress.emit(Phase::Failed, error.message.clone());
                Err(error)
            }
        }
    }

    async fn run_phases(
        &self,
        state: &mut AnalysisState,
        phase_times: &mut PhaseTimes,
        session: &Session,
        policy: &PhasePolicy,
        progress: &ProgressEmitter,
    ) -> Result<(), ErrorContext> {
        // Parallel
        self.enter(state, Phase::Parallel, progress)?;
        let (outcome, elapsed) = self.run_parallel(state, session, policy, progress).await?;
        for result in outcome.results {
            state.set_result(result)?;
        }
        phase_times.record(Phase::Parallel, elapsed);

        // Evaluation
        self.enter(state, Phase::Evaluation, progress)?;
        let phase_start = Instant::now();
        let evaluation = self
            .evaluator
            .evaluate(state)
            .map_err(EvaluationError::into_context)?;
        info!(
            score = evaluation.opportunity_score,
            recommendation = %evaluation.recommendation,
            confidence = evaluation.confidence,
            "Opportunity evaluated"
        );
        state.set_evaluation(evaluation)?;
        phase_times.record(Phase::Evaluation, phase_start.elapsed());

        // Report
        self.enter(state, Phase::Report, progress)?;
        let phase_start = Instant::now();
        let report = self
            .reporter
            .render(state)
            .map_err(ReportError::into_context)?;
        state.set_report(report)?;
        phase_times.record(Phase::Report, phase_start.elapsed());

        self.enter(state, Phase::Done, progress)
    }

    fn enter(
        &self,
        state: &mut AnalysisState,
        phase: Phase,
        progress: &ProgressEmitter,
    ) -> Result<(), ErrorContext> {
        state.advance(phase)?;
        info!(phase = %phase, "Entered phase");
        progress.phase_entered(phase);
        Ok(())
    }

    /// Runs the parallel stage with retry. Each attempt starts from scratch;
    /// only the successful attempt's duration is returned.
    async fn run_parallel(
        &self,
        state: &AnalysisState,
        session: &Session,
        policy: &PhasePolicy,
        progress: &ProgressEmitter,
    ) -> Result<(StageOutcome, Duration), ErrorContext> {
        let request = Arc::new(state.request().clone());
        let session = Arc::new(session.clone());
        let stage = &self.stage;
        let timeout = policy.timeout;

        retry_on_timeout(policy.max_retries, policy.retry_delay, |attempt| {
            let request = Arc::clone(&request);
            let session = Arc::clone(&session);
            if attempt > 1 {
                progress.emit(
                    Phase::Parallel,
                    format!(
                        "Retrying analyses (attempt {} of {})",
                        attempt,
                        policy.max_retries.saturating_add(1)
                    ),
                );
            }
            async move {
                let attempt_start = Instant::now();
                let outcome = stage.run(request, session, timeout).await?;
                Ok::<_, ErrorContext>((outcome, attempt_start.elapsed()))
            }
        })
        .await
    }
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("stage", &self.stage)
            .field("evaluator", &self.evaluator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentError, AnalysisResult, AnalysisTask, Dimension, SharedTask};
    use crate::error::ErrorCategory;
    use crate::progress::{ChannelObserver, ProgressEvent};
    use crate::request::RequestFields;
    use crate::session::SessionManager;
    use async_trait::async_trait;

    struct FixedTask {
        dimension: Dimension,
        score: Option<u8>,
    }

    #[async_trait]
    impl AnalysisTask for FixedTask {
        fn dimension(&self) -> Dimension {
            self.dimension
        }

        async fn execute(
            &self,
            _request: &AnalysisRequest,
            _session: &Session,
        ) -> Result<AnalysisResult, AgentError> {
            match self.score {
                Some(score) => Ok(AnalysisResult::new(self.dimension, score, "fixed")),
                None => Err(AgentError::ExecutionFailed("down".into())),
            }
        }
    }

    fn tasks(scores: [Option<u8>; 4]) -> TaskSet {
        let [t, m, c, p] = scores;
        let make = |dimension, score| -> SharedTask { Arc::new(FixedTask { dimension, score }) };
        TaskSet::new(
            make(Dimension::Trend, t),
            make(Dimension::Market, m),
            make(Dimension::Competition, c),
            make(Dimension::Profit, p),
        )
        .unwrap()
    }

    fn request() -> AnalysisRequest {
        RequestFields::new("water bottle", "US", "fba", "medium")
            .validate()
            .unwrap()
    }

    fn session() -> Session {
        SessionManager::new("test", Duration::from_secs(60)).create_session("u")
    }

    struct BrokenReporter;

    impl Reporter for BrokenReporter {
        fn render(&self, _state: &AnalysisState) -> Result<String, ReportError> {
            Err(ReportError::Render(minijinja::Error::new(
                minijinja::ErrorKind::InvalidOperation,
                "renderer offline",
            )))
        }
    }

    #[tokio::test]
    async fn test_successful_run_visits_every_phase() {
        let orchestrator =
            PipelineOrchestrator::new(tasks([Some(80), Some(70), Some(60), Some(90)]));
        let (observer, mut rx) = ChannelObserver::new(16);
        let progress = ProgressEmitter::new(Some(Arc::new(observer)), Instant::now());

        let result = orchestrator
            .execute(request(), &session(), &PhasePolicy::default(), &progress)
            .await
            .unwrap();

        assert_eq!(
            result.state.phase_history(),
            [
                Phase::Pending,
                Phase::Parallel,
                Phase::Evaluation,
                Phase::Report,
                Phase::Done
            ]
        );
        assert_eq!(result.state.current_phase(), Phase::Done);
        assert_eq!(result.opportunity_score(), Some(76));
        assert!(result.report_text().is_some());
        assert!(result.phase_times.total() <= result.execution_time);
        assert!(!result.phase_times.contains(Phase::Done));

        drop(progress);
        let mut phases = Vec::new();
        while let Ok(event) = rx.try_recv() {
            phases.push(event.phase);
        }
        assert_eq!(
            phases,
            [
                Phase::Pending,
                Phase::Parallel,
                Phase::Evaluation,
                Phase::Report,
                Phase::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_total_failure_stops_in_parallel() {
        let orchestrator = PipelineOrchestrator::new(tasks([None, None, None, None]));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer = move |event: &ProgressEvent| sink.lock().unwrap().push(event.phase);
        let progress = ProgressEmitter::new(Some(Arc::new(observer)), Instant::now());

        let err = orchestrator
            .execute(request(), &session(), &PhasePolicy::default(), &progress)
            .await
            .unwrap_err();

        assert_eq!(err.category, ErrorCategory::AgentFailure);
        assert_eq!(err.phase, Phase::Parallel);
        assert_eq!(err.attempts, 1);
        assert_eq!(seen.lock().unwrap().last(), Some(&Phase::Failed));
    }

    #[tokio::test]
    async fn test_reporter_failure_is_agent_failure_in_report_phase() {
        let orchestrator =
            PipelineOrchestrator::new(tasks([Some(80), Some(70), Some(60), Some(90)]))
                .with_reporter(BrokenReporter);

        let err = orchestrator
            .execute(
                request(),
                &session(),
                &PhasePolicy::default(),
                &ProgressEmitter::disabled(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.category, ErrorCategory::AgentFailure);
        assert_eq!(err.phase, Phase::Report);
    }

    #[tokio::test]
    async fn test_result_exports() {
        let orchestrator = PipelineOrchestrator::new(tasks([Some(80), Some(70), None, Some(90)]));
        let result = orchestrator
            .execute(
                request(),
                &session(),
                &PhasePolicy::default(),
                &ProgressEmitter::disabled(),
            )
            .await
            .unwrap();

        assert_eq!(
            result.to_summary(),
            "Category: water bottle | Score: 79/100 | Recommendation: STRONG | Confidence: 80%"
        );

        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["session_id"], result.session_id.as_str());
        assert_eq!(json["state"]["evaluation_result"]["opportunity_score"], 79);
    }

    #[test]
    fn test_policy_from_config() {
        let config = PipelineConfig::default()
            .with_timeout_seconds(2.5)
            .with_max_retries(1)
            .with_retry_delay_ms(20);
        let policy = PhasePolicy::from_config(&config);

        assert_eq!(policy.timeout, Duration::from_millis(2500));
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.retry_delay, Duration::from_millis(20));
    }
}

//! Phase state machine and the analysis state it drives.
//!
//! Phases advance in a fixed order:
//!
//! ```text
//! Pending -> Parallel -> Evaluation -> Report -> Done
//!    \__________\____________\__________\______-> Failed
//! ```
//!
//! `Failed` is terminal and reachable from any non-terminal phase. Nothing
//! ever moves backwards.

use crate::agent::{AnalysisResult, Dimension};
use crate::error::ErrorContext;
use crate::evaluator::EvaluationResult;
use crate::request::AnalysisRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A stage of the pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Pending,
    Parallel,
    Evaluation,
    Report,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "pending",
            Phase::Parallel => "parallel",
            Phase::Evaluation => "evaluation",
            Phase::Report => "report",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }

    /// The phase reached on success, or `None` for terminal phases.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Pending => Some(Phase::Parallel),
            Phase::Parallel => Some(Phase::Evaluation),
            Phase::Evaluation => Some(Phase::Report),
            Phase::Report => Some(Phase::Done),
            Phase::Done | Phase::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }

    /// Whether `self -> to` is an allowed transition.
    pub fn can_transition_to(&self, to: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Phase::Failed || self.next() == Some(to)
    }

    /// Human-readable description used in progress events.
    pub fn description(&self) -> &'static str {
        match self {
            Phase::Pending => "Pipeline initialized, ready to start",
            Phase::Parallel => "Running trend, market, competition and profit analyses",
            Phase::Evaluation => "Evaluating overall opportunity",
            Phase::Report => "Generating final report",
            Phase::Done => "Analysis complete",
            Phase::Failed => "Analysis failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Elapsed time per phase, only for phases that were actually entered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimes {
    times: BTreeMap<Phase, Duration>,
}

impl PhaseTimes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, phase: Phase, elapsed: Duration) {
        self.times.insert(phase, elapsed);
    }

    pub fn get(&self, phase: Phase) -> Option<Duration> {
        self.times.get(&phase).copied()
    }

    pub fn contains(&self, phase: Phase) -> bool {
        self.times.contains_key(&phase)
    }

    pub fn total(&self) -> Duration {
        self.times.values().sum()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Entries in phase order.
    pub fn iter(&self) -> impl Iterator<Item = (Phase, Duration)> + '_ {
        self.times.iter().map(|(p, d)| (*p, *d))
    }
}

/// Everything the pipeline knows about one run.
///
/// Mutated only by the orchestrator, one field at a time. Each partial
/// result, the evaluation and the report are written at most once, and the
/// setters enforce the chain `report => evaluation => at least one partial`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisState {
    request: AnalysisRequest,
    current_phase: Phase,
    phase_history: Vec<Phase>,
    trend_result: Option<AnalysisResult>,
    market_result: Option<AnalysisResult>,
    competition_result: Option<AnalysisResult>,
    profit_result: Option<AnalysisResult>,
    evaluation_result: Option<EvaluationResult>,
    report_text: Option<String>,
    error_message: Option<String>,
}

impl AnalysisState {
    pub fn new(request: AnalysisRequest) -> Self {
        Self {
            request,
            current_phase: Phase::Pending,
            phase_history: vec![Phase::Pending],
            trend_result: None,
            market_result: None,
            competition_result: None,
            profit_result: None,
            evaluation_result: None,
            report_text: None,
            error_message: None,
        }
    }

    pub fn request(&self) -> &AnalysisRequest {
        &self.request
    }

    pub fn current_phase(&self) -> Phase {
        self.current_phase
    }

    /// Every phase entered so far, in order.
    pub fn phase_history(&self) -> &[Phase] {
        &self.phase_history
    }

    /// Moves to `to`, rejecting any out-of-order transition.
    pub fn advance(&mut self, to: Phase) -> Result<(), ErrorContext> {
        if !self.current_phase.can_transition_to(to) {
            return Err(ErrorContext::defect(
                self.current_phase,
                format!(
                    "illegal phase transition {} -> {}",
                    self.current_phase, to
                ),
            ));
        }
        self.current_phase = to;
        self.phase_history.push(to);
        Ok(())
    }

    /// Moves to `Failed`, remembering why. Already-terminal states are left alone.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.current_phase.is_terminal() {
            return;
        }
        self.error_message = Some(message.into());
        self.current_phase = Phase::Failed;
        self.phase_history.push(Phase::Failed);
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn result(&self, dimension: Dimension) -> Option<&AnalysisResult> {
        self.slot(dimension).as_ref()
    }

    pub fn trend_result(&self) -> Option<&AnalysisResult> {
        self.trend_result.as_ref()
    }

    pub fn market_result(&self) -> Option<&AnalysisResult> {
        self.market_result.as_ref()
    }

    pub fn competition_result(&self) -> Option<&AnalysisResult> {
        self.competition_result.as_ref()
    }

    pub fn profit_result(&self) -> Option<&AnalysisResult> {
        self.profit_result.as_ref()
    }

    /// Dimensions that have a partial result, in declaration order.
    pub fn completed_dimensions(&self) -> Vec<Dimension> {
        Dimension::ALL
            .into_iter()
            .filter(|d| self.result(*d).is_some())
            .collect()
    }

    /// Dimensions without a partial result, in declaration order.
    pub fn missing_dimensions(&self) -> Vec<Dimension> {
        Dimension::ALL
            .into_iter()
            .filter(|d| self.result(*d).is_none())
            .collect()
    }

    pub fn has_any_result(&self) -> bool {
        Dimension::ALL.iter().any(|d| self.result(*d).is_some())
    }

    /// Fills a partial-result slot. Only allowed during the parallel phase, once per slot.
    pub fn set_result(&mut self, result: AnalysisResult) -> Result<(), ErrorContext> {
        let phase = self.current_phase;
        if phase != Phase::Parallel {
            return Err(ErrorContext::defect(
                phase,
                format!("{} result written outside the parallel phase", result.dimension),
            ));
        }
        let dimension = result.dimension;
        if let Err(e) = result.validate_for(dimension) {
            return Err(ErrorContext::defect(phase, format!("{} result rejected", dimension))
                .with_detail(e.to_string()));
        }
        let slot = self.slot_mut(dimension);
        if slot.is_some() {
            return Err(ErrorContext::defect(
                phase,
                format!("{} result written twice", dimension),
            ));
        }
        *slot = Some(result);
        Ok(())
    }

    pub fn evaluation_result(&self) -> Option<&EvaluationResult> {
        self.evaluation_result.as_ref()
    }

    pub fn set_evaluation(&mut self, evaluation: EvaluationResult) -> Result<(), ErrorContext> {
        let phase = self.current_phase;
        if !self.has_any_result() {
            return Err(ErrorContext::defect(
                phase,
                "evaluation recorded without any partial result",
            ));
        }
        if self.evaluation_result.is_some() {
            return Err(ErrorContext::defect(phase, "evaluation written twice"));
        }
        self.evaluation_result = Some(evaluation);
        Ok(())
    }

    pub fn report_text(&self) -> Option<&str> {
        self.report_text.as_deref()
    }

    pub fn set_report(&mut self, report: String) -> Result<(), ErrorContext> {
        let phase = self.current_phase;
        if self.evaluation_result.is_none() {
            return Err(ErrorContext::defect(
                phase,
                "report recorded without an evaluation",
            ));
        }
        if self.report_text.is_some() {
            return Err(ErrorContext::defect(phase, "report written twice"));
        }
        self.report_text = Some(report);
        Ok(())
    }

    fn slot(&self, dimension: Dimension) -> &Option<AnalysisResult> {
        match dimension {
            Dimension::Trend => &self.trend_result,
            Dimension::Market => &self.market_result,
            Dimension::Competition => &self.competition_result,
            Dimension::Profit => &self.profit_result,
        }
    }

    fn slot_mut(&mut self, dimension: Dimension) -> &mut Option<AnalysisResult> {
        match dimension {
            Dimension::Trend => &mut self.trend_result,
            Dimension::Market => &mut self.market_result,
            Dimension::Competition => &mut self.competition_result,
            Dimension::Profit => &mut self.profit_result,
        }
    }
}

//! Analysis task capability.
//!
//! The pipeline never computes an analysis itself. Each of the four
//! dimensions (trend, market, competition, profit) is produced by an
//! externally supplied [`AnalysisTask`]; the orchestrator only depends on this
//! trait.
//!
//! # Implementing a task
//!
//! ```rust,ignore
//! use scout_pipeline::agent::{AnalysisResult, AnalysisTask, AgentError, Dimension};
//! use scout_pipeline::{AnalysisRequest, Session};
//!
//! struct TrendTask {
//!     client: MyLlmClient,
//! }
//!
//! #[async_trait::async_trait]
//! impl AnalysisTask for TrendTask {
//!     fn dimension(&self) -> Dimension {
//!         Dimension::Trend
//!     }
//!
//!     async fn execute(
//!         &self,
//!         request: &AnalysisRequest,
//!         _session: &Session,
//!     ) -> Result<AnalysisResult, AgentError> {
//!         let raw = self
//!             .client
//!             .complete(format!("Search trend for {}", request.category()))
//!             .await
//!             .map_err(|e| AgentError::ExecutionFailed(e.to_string()))?;
//!         let score = parse_score(&raw).ok_or_else(|| AgentError::InvalidOutput(raw.clone()))?;
//!         Ok(AnalysisResult::new(Dimension::Trend, score, raw))
//!     }
//! }
//! ```
//!
//! Tasks run concurrently with each other and must not share mutable state.

pub mod error;

pub use error::AgentError;

use crate::request::AnalysisRequest;
use crate::session::Session;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Highest score a dimension may report.
pub const MAX_SCORE: u8 = 100;

/// One axis of the opportunity assessment.
///
/// The declaration order is significant: it is the order tasks are listed
/// in, the order failures are reported in and the order reports are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Trend,
    Market,
    Competition,
    Profit,
}

impl Dimension {
    /// All dimensions in declaration order.
    pub const ALL: [Dimension; 4] = [
        Dimension::Trend,
        Dimension::Market,
        Dimension::Competition,
        Dimension::Profit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Trend => "trend",
            Dimension::Market => "market",
            Dimension::Competition => "competition",
            Dimension::Profit => "profit",
        }
    }

    /// Heading used in rendered reports.
    pub fn title(&self) -> &'static str {
        match self {
            Dimension::Trend => "Trend",
            Dimension::Market => "Market",
            Dimension::Competition => "Competition",
            Dimension::Profit => "Profit",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The partial result one task produces for its dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub dimension: Dimension,
    /// Attractiveness of the opportunity along this dimension, 0 to 100.
    pub score: u8,
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    /// Free-form structured payload (market size, competitor list, ...).
    #[serde(default)]
    pub details: serde_json::Value,
}

impl AnalysisResult {
    pub fn new(dimension: Dimension, score: u8, summary: impl Into<String>) -> Self {
        Self {
            dimension,
            score,
            summary: summary.into(),
            highlights: Vec::new(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_highlights<I, S>(mut self, highlights: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.highlights = highlights.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Checks the result against the slot it is about to fill.
    pub fn validate_for(&self, expected: Dimension) -> Result<(), AgentError> {
        if self.dimension != expected {
            return Err(AgentError::InvalidOutput(format!(
                "{} task returned a {} result",
                expected, self.dimension
            )));
        }
        if self.score > MAX_SCORE {
            return Err(AgentError::InvalidOutput(format!(
                "{} score {} is outside 0..={}",
                expected, self.score, MAX_SCORE
            )));
        }
        Ok(())
    }
}

/// A unit of analysis producing one dimension's partial result.
#[async_trait]
pub trait AnalysisTask: Send + Sync {
    /// The dimension this task fills.
    fn dimension(&self) -> Dimension;

    /// Runs the analysis.
    ///
    /// Failures are reported as an [`AgentError`], never by panicking.
    async fn execute(
        &self,
        request: &AnalysisRequest,
        session: &Session,
    ) -> Result<AnalysisResult, AgentError>;

    /// Returns the name of this task, used in logs and error contexts.
    fn name(&self) -> String {
        self.dimension().to_string()
    }

    /// Checks that the task's backend is usable before the first run.
    ///
    /// By default, this always returns `Ok(())`. Implementations should override
    /// this to check for API keys or service reachability.
    async fn is_available(&self) -> Result<(), AgentError> {
        Ok(())
    }
}

/// A shared, type-erased analysis task.
pub type SharedTask = Arc<dyn AnalysisTask>;

/// Exactly one task per dimension.
#[derive(Clone)]
pub struct TaskSet {
    trend: SharedTask,
    market: SharedTask,
    competition: SharedTask,
    profit: SharedTask,
}

impl TaskSet {
    /// Builds the set, checking each task fills the slot it is given.
    pub fn new(
        trend: SharedTask,
        market: SharedTask,
        competition: SharedTask,
        profit: SharedTask,
    ) -> Result<Self, AgentError> {
        let set = Self {
            trend,
            market,
            competition,
            profit,
        };
        for (slot, task) in set.iter() {
            if task.dimension() != slot {
                return Err(AgentError::Other(format!(
                    "task '{}' reports dimension {} but was registered for {}",
                    task.name(),
                    task.dimension(),
                    slot
                )));
            }
        }
        Ok(set)
    }

    pub fn get(&self, dimension: Dimension) -> &SharedTask {
        match dimension {
            Dimension::Trend => &self.trend,
            Dimension::Market => &self.market,
            Dimension::Competition => &self.competition,
            Dimension::Profit => &self.profit,
        }
    }

    /// Tasks paired with their slot, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, &SharedTask)> + '_ {
        Dimension::ALL.into_iter().map(move |d| (d, self.get(d)))
    }
}

impl fmt::Debug for TaskSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(d, task)| (d, task.name())))
            .finish()
    }
}

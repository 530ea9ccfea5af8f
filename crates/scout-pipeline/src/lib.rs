//! 'scout-pipeline' - A concurrent analysis pipeline for product-opportunity research.
//!
//! The crate fans one [`AnalysisRequest`] out to four independent analysis
//! tasks (trend, market, competition, profit), joins whatever they manage to
//! produce, combines the partial results into a weighted opportunity score,
//! and renders a narrative report. Analysis content itself comes from
//! externally supplied [`AnalysisTask`] implementations, typically LLM calls.
//!
//! What the pipeline guarantees:
//!
//! - **Fault isolation**: a failing, panicking or slow task never cancels
//!   its siblings. The run continues if at least one task succeeds, with the
//!   missing weights renormalized and the loss reported as lower confidence.
//! - **Deterministic phases**: `pending -> parallel -> evaluation -> report
//!   -> done`, or `failed`, never out of order.
//! - **Typed failure**: every run ends in exactly one of [`PipelineResult`]
//!   or [`ErrorContext`]; nothing is raised past [`PipelineRunner::run_analysis`].
//! - **Retry on timeout**: a timed-out parallel phase is re-run up to
//!   `max_retries` times.
//! - **Bounded load**: at most `max_concurrent_analyses` runs execute at once
//!   per runner, and identical requests can be served from a TTL cache.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use scout_pipeline::{PipelineConfig, PipelineRunner, RequestFields, TaskSet};
//! use scout_pipeline::progress::ChannelObserver;
//! use std::sync::Arc;
//!
//! let tasks = TaskSet::new(trend, market, competition, profit)?;
//! let (observer, mut events) = ChannelObserver::new(32);
//! let mut runner = PipelineRunner::new(PipelineConfig::default(), tasks)?
//!     .with_observer(Arc::new(observer));
//!
//! let result = runner
//!     .analyze(RequestFields::new("camping lantern", "US", "fba", "medium"), "alice")
//!     .await?;
//! println!("score: {:?}", result.opportunity_score());
//! ```

pub mod agent;
pub mod cache;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod history;
pub mod observability;
pub mod orchestrator;
pub mod progress;
pub mod report;
pub mod request;
pub mod retry;
pub mod runner;
pub mod session;

pub use agent::{AgentError, AnalysisResult, AnalysisTask, Dimension, SharedTask, TaskSet};
pub use cache::{CacheStats, ResultCache};
pub use config::{ConfigError, PipelineConfig};
pub use error::{ErrorCategory, ErrorContext};
pub use evaluator::{EvaluationResult, Evaluator, Recommendation, Weights};
pub use history::{HistoryEntry, HistorySink, InMemoryHistory};
pub use orchestrator::{
    AnalysisState, ParallelStage, Phase, PhasePolicy, PhaseTimes, PipelineOrchestrator,
    PipelineResult,
};
pub use progress::{ChannelObserver, ProgressEvent, ProgressObserver};
pub use report::{NarrativeReporter, Reporter};
pub use request::{AnalysisRequest, RequestFields, RequestValidationError};
pub use runner::PipelineRunner;
pub use session::{Session, SessionManager};

//! Error types for analysis tasks.

use crate::error::{ErrorCategory, ErrorContext};
use crate::orchestrator::state::Phase;
use std::time::Duration;
use thiserror::Error;

/// Errors an analysis task may report instead of a result.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The task ran but could not produce an analysis.
    #[error("Agent execution failed: {0}")]
    ExecutionFailed(String),

    /// The task produced output that does not satisfy the result contract.
    #[error("Invalid agent output: {0}")]
    InvalidOutput(String),

    /// The task did not finish within its time budget.
    #[error("Agent timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The task's backend is not usable (missing credential, unreachable service).
    #[error("Agent unavailable: {0}")]
    Unavailable(String),

    /// The task panicked or was aborted before returning.
    #[error("Agent task aborted: {0}")]
    Aborted(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A generic error for other cases.
    #[error("Agent error: {0}")]
    Other(String),
}

impl AgentError {
    /// The pipeline-level category this error is reported under.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AgentError::Timeout { .. } => ErrorCategory::Timeout,
            AgentError::Unavailable(_) => ErrorCategory::Config,
            _ => ErrorCategory::AgentFailure,
        }
    }

    /// Check if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AgentError::Timeout { .. })
    }

    /// Wraps the error into an [`ErrorContext`] attributed to `agent_name`.
    pub fn into_context(self, phase: Phase, agent_name: &str) -> ErrorContext {
        let category = self.category();
        ErrorContext::new(
            category,
            phase,
            format!("{} analysis failed: {}", agent_name, category.user_message()),
        )
        .with_detail(self.to_string())
        .with_agent(agent_name)
    }
}

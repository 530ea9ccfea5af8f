//! Error categories and the error context returned by failed runs.
//!
//! Every failure that leaves the pipeline is an [`ErrorContext`]: a category,
//! a user-facing message, the phase that produced it and optional technical
//! detail. The concern-specific error enums (`AgentError`, `ConfigError`,
//! `RequestValidationError`, ...) all convert into it.

use crate::orchestrator::state::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Business-level category of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// The request was malformed.
    Validation,
    /// Configuration is invalid or incomplete (e.g. an absent credential).
    Config,
    /// An analysis task, the evaluator or the reporter failed or returned malformed data.
    AgentFailure,
    /// A phase exceeded its time budget.
    Timeout,
    /// An invariant was violated. Always a defect.
    Unknown,
}

impl ErrorCategory {
    /// Stable identifier used in logs and serialized output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "VALIDATION",
            ErrorCategory::Config => "CONFIG",
            ErrorCategory::AgentFailure => "AGENT_FAILURE",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::Unknown => "UNKNOWN",
        }
    }

    /// Returns `true` if a phase failing with this category may be re-run.
    ///
    /// Only timeouts are retried. Validation and configuration problems will
    /// fail the same way on every attempt, and task failures are already
    /// isolated inside the parallel stage.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Timeout)
    }

    /// Short explanation suitable for end users.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "The analysis request is not valid",
            ErrorCategory::Config => "The system is not configured correctly",
            ErrorCategory::AgentFailure => "An analysis step could not be completed",
            ErrorCategory::Timeout => "The analysis took longer than expected",
            ErrorCategory::Unknown => "An unexpected internal error occurred",
        }
    }

    /// What the user can do about it.
    pub fn suggestion(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "Check the request fields and try again",
            ErrorCategory::Config => "Check the API credentials and pipeline settings",
            ErrorCategory::AgentFailure => {
                "Try again; contact support if the problem persists"
            }
            ErrorCategory::Timeout => "Try a narrower product category or raise the timeout",
            ErrorCategory::Unknown => "Please report this problem",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contextual information about a failed run.
///
/// Exactly one of these is produced per failed `run_analysis` call.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{category} error in {phase} phase: {message}")]
pub struct ErrorContext {
    pub category: ErrorCategory,
    pub message: String,
    /// The phase that was executing when the failure happened.
    pub phase: Phase,
    /// Diagnostic detail for logs; not meant for end users.
    pub technical_detail: Option<String>,
    /// The analysis dimension that failed, when a single task is to blame.
    pub agent_name: Option<String>,
    /// How many times the failing phase was attempted.
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

impl ErrorContext {
    pub fn new(category: ErrorCategory, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            phase,
            technical_detail: None,
            agent_name: None,
            attempts: 1,
            timestamp: Utc::now(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, Phase::Pending, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Config, Phase::Pending, message)
    }

    pub fn agent_failure(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::AgentFailure, phase, message)
    }

    pub fn timeout(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Timeout, phase, message)
    }

    /// An invariant violation. Reaching this is a bug in the pipeline.
    pub fn defect(phase: Phase, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Unknown, phase, message)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.technical_detail = Some(detail.into());
        self
    }

    pub fn with_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Message combined with the category's suggestion, for display.
    pub fn user_message(&self) -> String {
        format!("{}. {}", self.message, self.category.suggestion())
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_timeout_is_retryable() {
        assert!(ErrorCategory::Timeout.is_retryable());
        assert!(!ErrorCategory::Validation.is_retryable());
        assert!(!ErrorCategory::Config.is_retryable());
        assert!(!ErrorCategory::AgentFailure.is_retryable());
        assert!(!ErrorCategory::Unknown.is_retryable());
    }

    #[test]
    fn test_validation_and_config_fail_before_any_phase() {
        assert_eq!(ErrorContext::validation("bad").phase, Phase::Pending);
        assert_eq!(ErrorContext::config("bad").phase, Phase::Pending);
    }

    #[test]
    fn test_display_names_category_and_phase() {
        let err = ErrorContext::agent_failure(Phase::Parallel, "all tasks failed");
        assert_eq!(
            err.to_string(),
            "AGENT_FAILURE error in parallel phase: all tasks failed"
        );
    }

    #[test]
    fn test_builder_fields() {
        let err = ErrorContext::timeout(Phase::Parallel, "slow")
            .with_detail("exceeded 2s")
            .with_agent("trend")
            .with_attempts(3);

        assert_eq!(err.technical_detail.as_deref(), Some("exceeded 2s"));
        assert_eq!(err.agent_name.as_deref(), Some("trend"));
        assert_eq!(err.attempts, 3);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_serializes_category_as_screaming_case() {
        let err = ErrorContext::validation("category is required");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["category"], "VALIDATION");
        assert_eq!(json["phase"], "pending");
    }

    #[test]
    fn test_user_message_includes_suggestion() {
        let err = ErrorContext::config("missing API key");
        assert!(err.user_message().starts_with("missing API key. "));
        assert!(err.user_message().contains("credentials"));
    }
}

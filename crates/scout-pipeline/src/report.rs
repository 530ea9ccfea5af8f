//! Narrative report rendering.

use crate::agent::Dimension;
use crate::error::ErrorContext;
use crate::orchestrator::state::{AnalysisState, Phase};
use minijinja::Environment;
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    /// The state reached the report phase without an evaluation.
    #[error("cannot render a report without an evaluation result")]
    MissingEvaluation,

    #[error("failed to render report template: {0}")]
    Render(#[from] minijinja::Error),
}

impl ReportError {
    pub fn into_context(self) -> ErrorContext {
        match self {
            ReportError::MissingEvaluation => {
                ErrorContext::defect(Phase::Report, "report requested before evaluation")
                    .with_detail(self.to_string())
            }
            ReportError::Render(_) => {
                ErrorContext::agent_failure(Phase::Report, "the report could not be generated")
                    .with_detail(self.to_string())
            }
        }
    }
}

/// Renders a finished analysis into text.
pub trait Reporter: Send + Sync {
    fn render(&self, state: &AnalysisState) -> Result<String, ReportError>;
}

const DEFAULT_TEMPLATE: &str = r#"# Product Opportunity Report: {{ category }}

Target market: {{ target_market }} | Business model: {{ business_model }}
Budget: {{ budget_range }}
{% if keywords %}
Keywords: {{ keywords | join(", ") }}
{% endif %}

## Overall assessment

Opportunity score: {{ score }}/100
Recommendation: {{ recommendation }}
Confidence: {{ confidence }}%
{% for section in sections %}

## {{ section.title }} analysis ({{ section.score }}/100)

{{ section.summary }}
{% for item in section.highlights %}
- {{ item }}
{% endfor %}
{% endfor %}
{% if missing %}

## Missing analyses

The following analyses did not complete and were left out of the score: {{ missing | join(", ") }}.
{% endif %}"#;

#[derive(Serialize)]
struct Section<'a> {
    title: &'static str,
    score: u8,
    summary: &'a str,
    highlights: &'a [String],
}

#[derive(Serialize)]
struct ReportContext<'a> {
    category: &'a str,
    target_market: &'a str,
    business_model: &'a str,
    budget_range: &'a str,
    keywords: &'a [String],
    score: u8,
    recommendation: &'static str,
    confidence: u32,
    sections: Vec<Section<'a>>,
    missing: Vec<&'static str>,
}

/// Markdown-flavored narrative built from a minijinja template.
///
/// Completed dimensions get a section each, in declaration order; missing
/// ones are listed at the end.
#[derive(Debug, Clone)]
pub struct NarrativeReporter {
    template: Cow<'static, str>,
}

impl NarrativeReporter {
    pub fn new() -> Self {
        Self {
            template: Cow::Borrowed(DEFAULT_TEMPLATE),
        }
    }

    /// Replaces the built-in template. The template sees `category`,
    /// `target_market`, `business_model`, `budget_range`, `keywords`,
    /// `score`, `recommendation`, `confidence` (percent), `sections` and
    /// `missing`.
    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            template: Cow::Owned(template.into()),
        }
    }
}

impl Default for NarrativeReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for NarrativeReporter {
    fn render(&self, state: &AnalysisState) -> Result<String, ReportError> {
        let evaluation = state
            .evaluation_result()
            .ok_or(ReportError::MissingEvaluation)?;
        let request = state.request();

        let sections = Dimension::ALL
            .into_iter()
            .filter_map(|d| state.result(d).map(|r| (d, r)))
            .map(|(dimension, result)| Section {
                title: dimension.title(),
                score: result.score,
                summary: &result.summary,
                highlights: &result.highlights,
            })
            .collect();

        let context = ReportContext {
            category: request.category(),
            target_market: request.target_market(),
            business_model: request.business_model(),
            budget_range: request.budget_range(),
            keywords: request.keywords(),
            score: evaluation.opportunity_score,
            recommendation: evaluation.recommendation.as_str(),
            confidence: (evaluation.confidence * 100.0).round() as u32,
            sections,
            missing: evaluation
                .missing_dimensions
                .iter()
                .map(|d| d.title())
                .collect(),
        };

        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.add_template("report", &self.template)?;
        let tmpl = env.get_template("report")?;
        Ok(tmpl.render(context)?)
    }
}

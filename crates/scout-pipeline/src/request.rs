//! The validated, immutable analysis request.

use crate::error::ErrorContext;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted category.
pub const MAX_CATEGORY_LEN: usize = 200;
/// Most keywords accepted on a single request.
pub const MAX_KEYWORDS: usize = 10;

/// Reasons a request is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestValidationError {
    #[error("{0} is required and cannot be empty")]
    EmptyField(&'static str),

    #[error("category must be at most {MAX_CATEGORY_LEN} characters, got {0}")]
    CategoryTooLong(usize),

    #[error("at most {MAX_KEYWORDS} keywords are allowed, got {0}")]
    TooManyKeywords(usize),
}

impl RequestValidationError {
    /// The field the error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            RequestValidationError::EmptyField(field) => field,
            RequestValidationError::CategoryTooLong(_) => "category",
            RequestValidationError::TooManyKeywords(_) => "keywords",
        }
    }
}

impl From<RequestValidationError> for ErrorContext {
    fn from(err: RequestValidationError) -> Self {
        ErrorContext::validation(err.to_string()).with_detail(format!("field: {}", err.field()))
    }
}

/// Raw, unvalidated request fields as they arrive from a front end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestFields {
    pub category: String,
    pub target_market: String,
    pub business_model: String,
    pub budget_range: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl RequestFields {
    pub fn new(
        category: impl Into<String>,
        target_market: impl Into<String>,
        business_model: impl Into<String>,
        budget_range: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            target_market: target_market.into(),
            business_model: business_model.into(),
            budget_range: budget_range.into(),
            keywords: Vec::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Validates and normalizes the fields into an [`AnalysisRequest`].
    pub fn validate(self) -> Result<AnalysisRequest, RequestValidationError> {
        AnalysisRequest::new(
            self.category,
            self.target_market,
            self.business_model,
            self.budget_range,
            self.keywords,
        )
    }
}

/// What to analyze.
///
/// Construction is the only place validation happens, so every value of this
/// type is known to be well formed. Fields are private and there are no
/// setters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRequest {
    category: String,
    target_market: String,
    business_model: String,
    budget_range: String,
    keywords: Vec<String>,
}

impl AnalysisRequest {
    /// Builds a request, trimming every field.
    ///
    /// `target_market` is upper-cased, `business_model` and `budget_range`
    /// are lower-cased, and blank keywords are dropped. Fails on the first
    /// required field that is empty after trimming.
    pub fn new(
        category: impl Into<String>,
        target_market: impl Into<String>,
        business_model: impl Into<String>,
        budget_range: impl Into<String>,
        keywords: Vec<String>,
    ) -> Result<Self, RequestValidationError> {
        let category = category.into().trim().to_string();
        let target_market = target_market.into().trim().to_uppercase();
        let business_model = business_model.into().trim().to_lowercase();
        let budget_range = budget_range.into().trim().to_lowercase();

        for (name, value) in [
            ("category", &category),
            ("target_market", &target_market),
            ("business_model", &business_model),
            ("budget_range", &budget_range),
        ] {
            if value.is_empty() {
                return Err(RequestValidationError::EmptyField(name));
            }
        }

        let category_len = category.chars().count();
        if category_len > MAX_CATEGORY_LEN {
            return Err(RequestValidationError::CategoryTooLong(category_len));
        }

        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.len() > MAX_KEYWORDS {
            return Err(RequestValidationError::TooManyKeywords(keywords.len()));
        }

        Ok(Self {
            category,
            target_market,
            business_model,
            budget_range,
            keywords,
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn target_market(&self) -> &str {
        &self.target_market
    }

    pub fn business_model(&self) -> &str {
        &self.business_model
    }

    pub fn budget_range(&self) -> &str {
        &self.budget_range
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// The category followed by the keywords, without duplicates, in order.
    pub fn all_keywords(&self) -> Vec<&str> {
        let mut all: Vec<&str> = Vec::with_capacity(self.keywords.len() + 1);
        for term in std::iter::once(self.category.as_str())
            .chain(self.keywords.iter().map(String::as_str))
        {
            if !all.contains(&term) {
                all.push(term);
            }
        }
        all
    }
}

impl<'de> Deserialize<'de> for AnalysisRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        RequestFields::deserialize(deserializer)?
            .validate()
            .map_err(serde::de::Error::custom)
    }
}

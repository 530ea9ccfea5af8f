//! Weighted opportunity scoring.
//!
//! The evaluator is pure computation over the partial results already in the
//! [`AnalysisState`]. Missing dimensions are dropped and the remaining weights
//! renormalized; the share of weight that was available is reported as the
//! confidence.

use crate::agent::{Dimension, MAX_SCORE};
use crate::error::ErrorContext;
use crate::orchestrator::state::{AnalysisState, Phase};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Weights are kept in percentage points so scoring is exact integer math.
pub const WEIGHT_TOTAL: u32 = 100;

/// Score at or above which an opportunity is a strong recommendation.
pub const STRONG_THRESHOLD: u8 = 75;
/// Score at or above which an opportunity is a moderate recommendation.
pub const MODERATE_THRESHOLD: u8 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("no partial result is available to evaluate")]
    NoPartialResults,

    #[error("weights must sum to {WEIGHT_TOTAL}, got {0}")]
    InvalidWeights(u32),

    #[error("{dimension} score {score} is outside 0..={MAX_SCORE}")]
    ScoreOutOfRange { dimension: Dimension, score: u8 },
}

impl EvaluationError {
    /// Evaluation only fails on broken invariants, so every failure is a defect.
    pub fn into_context(self) -> ErrorContext {
        ErrorContext::defect(Phase::Evaluation, "evaluation could not be computed")
            .with_detail(self.to_string())
    }
}

/// Per-dimension weight, in percentage points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weights {
    pub trend: u32,
    pub market: u32,
    pub competition: u32,
    pub profit: u32,
}

impl Weights {
    pub const DEFAULT: Weights = Weights {
        trend: 25,
        market: 30,
        competition: 20,
        profit: 25,
    };

    pub fn new(
        trend: u32,
        market: u32,
        competition: u32,
        profit: u32,
    ) -> Result<Self, EvaluationError> {
        let weights = Self {
            trend,
            market,
            competition,
            profit,
        };
        let sum = weights.sum();
        if sum != WEIGHT_TOTAL {
            return Err(EvaluationError::InvalidWeights(sum));
        }
        Ok(weights)
    }

    pub fn get(&self, dimension: Dimension) -> u32 {
        match dimension {
            Dimension::Trend => self.trend,
            Dimension::Market => self.market,
            Dimension::Competition => self.competition,
            Dimension::Profit => self.profit,
        }
    }

    /// The raw weight as a fraction of 1.0.
    pub fn fraction(&self, dimension: Dimension) -> f64 {
        f64::from(self.get(dimension)) / f64::from(WEIGHT_TOTAL)
    }

    fn sum(&self) -> u32 {
        Dimension::ALL.iter().map(|d| self.get(*d)).sum()
    }

    /// Weights restricted to `included` and rescaled to sum to 1.0.
    pub fn normalized_over(&self, included: &[Dimension]) -> BTreeMap<Dimension, f64> {
        let total: u32 = included.iter().map(|d| self.get(*d)).sum();
        if total == 0 {
            return BTreeMap::new();
        }
        included
            .iter()
            .map(|d| (*d, f64::from(self.get(*d)) / f64::from(total)))
            .collect()
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Strong,
    Moderate,
    Weak,
}

impl Recommendation {
    pub fn from_score(score: u8) -> Self {
        if score >= STRONG_THRESHOLD {
            Recommendation::Strong
        } else if score >= MODERATE_THRESHOLD {
            Recommendation::Moderate
        } else {
            Recommendation::Weak
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Strong => "strong",
            Recommendation::Moderate => "moderate",
            Recommendation::Weak => "weak",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The combined assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Weighted score, 0 to 100.
    pub opportunity_score: u8,
    pub recommendation: Recommendation,
    /// Sum of the raw weights that had data, 0.0 to 1.0.
    pub confidence: f64,
    pub dimension_scores: BTreeMap<Dimension, u8>,
    pub missing_dimensions: Vec<Dimension>,
}

impl EvaluationResult {
    pub fn is_degraded(&self) -> bool {
        !self.missing_dimensions.is_empty()
    }
}

/// Combines the four partial results into an [`EvaluationResult`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator {
    weights: Weights,
}

impl Evaluator {
    pub fn new(weights: Weights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    /// Computes the weighted, renormalized opportunity score.
    ///
    /// `opportunity_score = round(sum(w_i * s_i) / sum(w_i))` over the
    /// dimensions present, rounding halves up.
    pub fn evaluate(&self, state: &AnalysisState) -> Result<EvaluationResult, EvaluationError> {
        let mut weighted_sum: u64 = 0;
        let mut included_weight: u64 = 0;
        let mut dimension_scores = BTreeMap::new();
        let mut missing_dimensions = Vec::new();

        for dimension in Dimension::ALL {
            match state.result(dimension) {
                Some(result) => {
                    if result.score > MAX_SCORE {
                        return Err(EvaluationError::ScoreOutOfRange {
                            dimension,
                            score: result.score,
                        });
                    }
                    let weight = u64::from(self.weights.get(dimension));
                    weighted_sum += weight * u64::from(result.score);
                    included_weight += weight;
                    dimension_scores.insert(dimension, result.score);
                }
                None => missing_dimensions.push(dimension),
            }
        }

        if included_weight == 0 {
            return Err(EvaluationError::NoPartialResults);
        }

        // Every score is at most MAX_SCORE, so the weighted mean is too.
        let rounded = (2 * weighted_sum + included_weight) / (2 * included_weight);
        let opportunity_score = rounded.min(u64::from(MAX_SCORE)) as u8;

        Ok(EvaluationResult {
            opportunity_score,
            recommendation: Recommendation::from_score(opportunity_score),
            confidence: included_weight as f64 / f64::from(WEIGHT_TOTAL),
            dimension_scores,
            missing_dimensions,
        })
    }
}

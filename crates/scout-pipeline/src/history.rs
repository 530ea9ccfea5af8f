//! Completed-run history.
//!
//! The runner hands every successful [`PipelineResult`] to a [`HistorySink`]
//! after the run reaches `Done`. Storage is the sink's business: a failing
//! sink is logged and never changes the result returned to the caller.

use crate::evaluator::Recommendation;
use crate::orchestrator::PipelineResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Receives completed runs.
pub trait HistorySink: Send + Sync {
    fn record(&self, result: &PipelineResult) -> anyhow::Result<()>;
}

/// A compact summary of one completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub session_id: String,
    pub category: String,
    pub target_market: String,
    pub opportunity_score: Option<u8>,
    pub recommendation: Option<Recommendation>,
    pub execution_time: Duration,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_result(result: &PipelineResult) -> Self {
        let request = result.state.request();
        Self {
            session_id: result.session_id.clone(),
            category: request.category().to_string(),
            target_market: request.target_market().to_string(),
            opportunity_score: result.opportunity_score(),
            recommendation: result.recommendation(),
            execution_time: result.execution_time,
            recorded_at: Utc::now(),
        }
    }
}

/// Keeps the newest `capacity` entries in memory, oldest evicted first.
#[derive(Debug)]
pub struct InMemoryHistory {
    capacity: usize,
    entries: Mutex<VecDeque<HistoryEntry>>,
}

impl InMemoryHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<HistoryEntry> {
        self.lock().back().cloned()
    }

    /// Entries whose category matches, ignoring case, newest first.
    pub fn find_by_category(&self, category: &str) -> Vec<HistoryEntry> {
        let needle = category.trim().to_lowercase();
        self.lock()
            .iter()
            .rev()
            .filter(|e| e.category.to_lowercase() == needle)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<HistoryEntry>> {
        // A poisoned lock still holds a consistent deque.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl HistorySink for InMemoryHistory {
    fn record(&self, result: &PipelineResult) -> anyhow::Result<()> {
        let mut entries = self.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(HistoryEntry::from_result(result));
        Ok(())
    }
}

//! Request-keyed result cache.
//!
//! Two requests with the same category, market, business model and budget
//! share a cached [`PipelineResult`] until it is older than the configured
//! TTL. Keywords are not part of the key.

use crate::orchestrator::PipelineResult;
use crate::request::AnalysisRequest;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Snapshot of the cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: usize,
    pub ttl_seconds: u64,
}

#[derive(Debug, Clone)]
struct CachedResult {
    result: PipelineResult,
    stored_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ResultCache {
    enabled: bool,
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedResult>>,
}

impl ResultCache {
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self {
            enabled,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// `category:market:model:budget`, from the normalized request.
    pub fn key(request: &AnalysisRequest) -> String {
        format!(
            "{}:{}:{}:{}",
            request.category(),
            request.target_market(),
            request.business_model(),
            request.budget_range()
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns a fresh cached result. An expired entry is dropped.
    pub fn get(&self, request: &AnalysisRequest) -> Option<PipelineResult> {
        self.get_at(request, Utc::now())
    }

    pub fn get_at(&self, request: &AnalysisRequest, now: DateTime<Utc>) -> Option<PipelineResult> {
        if !self.enabled {
            return None;
        }
        let key = Self::key(request);
        let mut entries = self.lock();
        let cached = entries.get(&key)?;

        let ttl = ChronoDuration::from_std(self.ttl).unwrap_or(ChronoDuration::MAX);
        if now.signed_duration_since(cached.stored_at) < ttl {
            return Some(cached.result.clone());
        }

        debug!(key = %key, "Cached result expired");
        entries.remove(&key);
        None
    }

    pub fn insert(&self, request: &AnalysisRequest, result: &PipelineResult) {
        self.insert_at(request, result, Utc::now());
    }

    pub fn insert_at(
        &self,
        request: &AnalysisRequest,
        result: &PipelineResult,
        now: DateTime<Utc>,
    ) {
        if !self.enabled {
            return;
        }
        self.lock().insert(
            Self::key(request),
            CachedResult {
                result: result.clone(),
                stored_at: now,
            },
        );
    }

    /// Empties the cache, returning how many entries were dropped.
    pub fn clear(&self) -> usize {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.enabled,
            entries: self.len(),
            ttl_seconds: self.ttl.as_secs(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedResult>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

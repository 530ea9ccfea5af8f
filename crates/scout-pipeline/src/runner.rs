//! Top-level driver.
//!
//! A [`PipelineRunner`] owns its configuration, its session store and an
//! orchestrator. Each call to [`PipelineRunner::run_analysis`] produces
//! exactly one `Result`: a [`PipelineResult`] or an [`ErrorContext`].
//!
//! At most `max_concurrent_analyses` runs execute at once on one runner;
//! further calls wait for a free slot. With `enable_caching` set, a request
//! matching a fresh cached result returns that result without running.
//!
//! # Example
//!
//! ```rust,ignore
//! use scout_pipeline::{PipelineConfig, PipelineRunner, RequestFields};
//!
//! let mut runner = PipelineRunner::new(PipelineConfig::from_env()?, tasks)?;
//! let fields = RequestFields::new("standing desk", "US", "fba", "medium");
//!
//! match runner.analyze(fields, "alice").await {
//!     Ok(result) => println!("{}", result.report_text().unwrap_or_default()),
//!     Err(err) => eprintln!("{}", err.user_message()),
//! }
//! ```

use crate::agent::TaskSet;
use crate::cache::{CacheStats, ResultCache};
use crate::config::{ConfigError, PipelineConfig};
use crate::error::ErrorContext;
use crate::evaluator::Evaluator;
use crate::history::HistorySink;
use crate::orchestrator::{Phase, PhasePolicy, PipelineOrchestrator, PipelineResult};
use crate::progress::{ProgressEmitter, ProgressObserver};
use crate::report::Reporter;
use crate::request::{AnalysisRequest, RequestFields};
use crate::session::{Session, SessionManager};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{OnceCell, Semaphore};
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

pub struct PipelineRunner {
    config: PipelineConfig,
    policy: PhasePolicy,
    orchestrator: PipelineOrchestrator,
    sessions: SessionManager,
    observer: Option<Arc<dyn ProgressObserver>>,
    history: Option<Arc<dyn HistorySink>>,
    cache: ResultCache,
    slots: Semaphore,
    preflight: OnceCell<Result<(), ErrorContext>>,
}

impl PipelineRunner {
    /// Creates a runner, failing with `CONFIG` if the configuration is invalid.
    pub fn new(config: PipelineConfig, tasks: TaskSet) -> Result<Self, ErrorContext> {
        config.validate()?;

        Ok(Self {
            policy: PhasePolicy::from_config(&config),
            orchestrator: PipelineOrchestrator::new(tasks),
            sessions: SessionManager::new(config.app_name.clone(), config.session_ttl()),
            observer: None,
            history: None,
            cache: ResultCache::new(config.enable_caching, config.cache_ttl()),
            slots: Semaphore::new(config.max_concurrent_analyses),
            preflight: OnceCell::new(),
            config,
        })
    }

    /// Registers the progress observer. Events are only emitted when
    /// `enable_streaming` is set.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.orchestrator = self.orchestrator.with_evaluator(evaluator);
        self
    }

    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.orchestrator = self.orchestrator.with_reporter(reporter);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn create_session(&mut self, user_id: &str) -> Session {
        self.sessions.purge_expired();
        self.sessions.create_session(user_id)
    }

    pub fn close_session(&mut self, session_id: &str) -> Option<Session> {
        self.sessions.close_session(session_id)
    }

    /// Runs currently holding an analysis slot.
    pub fn active_count(&self) -> usize {
        self.config.max_concurrent_analyses - self.slots.available_permits()
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Drops every cached result, returning how many were dropped.
    pub fn clear_cache(&self) -> usize {
        self.cache.clear()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Runs one analysis in a session this runner created.
    ///
    /// A session from another runner, or one that has expired, is rejected
    /// with `VALIDATION` before any phase starts. A cached result is returned
    /// as stored, still carrying the session id of the run that produced it.
    pub async fn run_analysis(
        &self,
        request: AnalysisRequest,
        session: &Session,
    ) -> Result<PipelineResult, ErrorContext> {
        let span = info_span!(
            "run_analysis",
            session_id = %session.session_id,
            category = %request.category(),
        );

        async move {
            self.check_session(session)?;

            if let Some(cached) = self.cache.get(&request) {
                info!(cached_session_id = %cached.session_id, "Using cached result");
                return Ok(cached);
            }

            self.check_availability().await?;

            let _slot = self.slots.acquire().await.map_err(|e| {
                ErrorContext::defect(Phase::Pending, "analysis slots are closed")
                    .with_detail(e.to_string())
            })?;
            debug!(active = self.active_count(), "Analysis slot acquired");

            let progress = if self.config.enable_streaming {
                ProgressEmitter::new(self.observer.clone(), Instant::now())
            } else {
                ProgressEmitter::disabled()
            };

            let cache_key = self.cache.is_enabled().then(|| request.clone());
            let result = self
                .orchestrator
                .execute(request, session, &self.policy, &progress)
                .await?;

            if let Some(request) = &cache_key {
                self.cache.insert(request, &result);
            }

            if let Some(history) = &self.history {
                if let Err(e) = history.record(&result) {
                    warn!(error = %e, "Failed to record analysis history");
                }
            }
            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Validates `fields`, runs them in a fresh session and closes it.
    ///
    /// An invalid request fails with `VALIDATION` without touching the
    /// session store.
    pub async fn analyze(
        &mut self,
        fields: RequestFields,
        user_id: &str,
    ) -> Result<PipelineResult, ErrorContext> {
        let request = fields.validate()?;
        let session = self.create_session(user_id);
        let result = self.run_analysis(request, &session).await;
        self.close_session(&session.session_id);
        result
    }

    fn check_session(&self, session: &Session) -> Result<(), ErrorContext> {
        if !self.sessions.owns(session) {
            return Err(
                ErrorContext::validation("The session was not created by this runner")
                    .with_detail(format!("session_id: {}", session.session_id)),
            );
        }
        if self.sessions.is_expired(session) {
            return Err(ErrorContext::validation("The session has expired")
                .with_detail(format!("expired at {}", session.expires_at())));
        }
        Ok(())
    }

    /// Checks every task once, before the first run. The outcome is cached.
    ///
    /// The four checks run concurrently; the first unavailable task in
    /// declaration order is reported.
    async fn check_availability(&self) -> Result<(), ErrorContext> {
        self.preflight
            .get_or_init(|| async {
                let checks = self
                    .orchestrator
                    .stage()
                    .tasks()
                    .iter()
                    .map(|(dimension, task)| async move {
                        (dimension, task.name(), task.is_available().await)
                    });

                for (dimension, name, availability) in join_all(checks).await {
                    if let Err(e) = availability {
                        warn!(dimension = %dimension, error = %e, "Analysis task unavailable");
                        let err = ConfigError::TaskUnavailable {
                            task: name,
                            reason: e.to_string(),
                        };
                        return Err(ErrorContext::from(err).with_agent(dimension.as_str()));
                    }
                }
                debug!("All analysis tasks available");
                Ok(())
            })
            .await
            .clone()
    }
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("sessions", &self.sessions.len())
            .field("streaming", &self.observer.is_some())
            .field("history", &self.history.is_some())
            .field("cache", &self.cache.stats())
            .field("active", &self.active_count())
            .finish()
    }
}

//! Mock analysis tasks shared by the integration tests.

#![allow(dead_code)]

use scout_pipeline::{
    AgentError, AnalysisRequest, AnalysisResult, AnalysisTask, Dimension, PipelineConfig,
    RequestFields, Session, SharedTask, TaskSet,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub type StartLog = Arc<Mutex<Vec<(Dimension, Instant)>>>;

/// Configurable mock task with a call counter and a start log.
#[derive(Clone)]
pub struct MockTask {
    dimension: Dimension,
    score: u8,
    delay: Duration,
    fail: bool,
    hang_first: u32,
    hang_for: Duration,
    available: bool,
    calls: Arc<AtomicU32>,
    log: StartLog,
}

impl MockTask {
    pub fn new(dimension: Dimension, score: u8) -> Self {
        Self {
            dimension,
            score,
            delay: Duration::from_millis(10),
            fail: false,
            hang_first: 0,
            hang_for: Duration::from_secs(30),
            available: true,
            calls: Arc::new(AtomicU32::new(0)),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(dimension: Dimension) -> Self {
        let mut task = Self::new(dimension, 0);
        task.fail = true;
        task
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sleeps `hang_for` on each of the first `calls` invocations.
    pub fn hanging_first(mut self, calls: u32, hang_for: Duration) -> Self {
        self.hang_first = calls;
        self.hang_for = hang_for;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_log(mut self, log: StartLog) -> Self {
        self.log = log;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }

    pub fn shared(&self) -> SharedTask {
        Arc::new(self.clone())
    }
}

#[async_trait::async_trait]
impl AnalysisTask for MockTask {
    fn dimension(&self) -> Dimension {
        self.dimension
    }

    async fn execute(
        &self,
        request: &AnalysisRequest,
        _session: &Session,
    ) -> Result<AnalysisResult, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.log
            .lock()
            .unwrap()
            .push((self.dimension, Instant::now()));

        if call <= self.hang_first {
            tokio::time::sleep(self.hang_for).await;
        }
        tokio::time::sleep(self.delay).await;

        if self.fail {
            return Err(AgentError::ExecutionFailed(format!(
                "{} service unavailable",
                self.dimension
            )));
        }
        Ok(AnalysisResult::new(
            self.dimension,
            self.score,
            format!("{} looks fine for {}", self.dimension, request.category()),
        )
        .with_highlights([format!("{} score {}", self.dimension, self.score)]))
    }

    async fn is_available(&self) -> Result<(), AgentError> {
        if self.available {
            Ok(())
        } else {
            Err(AgentError::Unavailable("API key not configured".into()))
        }
    }
}

/// Four mock tasks, one per dimension, in declaration order.
pub struct Mocks {
    pub trend: MockTask,
    pub market: MockTask,
    pub competition: MockTask,
    pub profit: MockTask,
}

impl Mocks {
    /// Scores 80, 70, 60, 90.
    pub fn scored() -> Self {
        Self {
            trend: MockTask::new(Dimension::Trend, 80),
            market: MockTask::new(Dimension::Market, 70),
            competition: MockTask::new(Dimension::Competition, 60),
            profit: MockTask::new(Dimension::Profit, 90),
        }
    }

    pub fn all_failing() -> Self {
        Self {
            trend: MockTask::failing(Dimension::Trend),
            market: MockTask::failing(Dimension::Market),
            competition: MockTask::failing(Dimension::Competition),
            profit: MockTask::failing(Dimension::Profit),
        }
    }

    pub fn map(self, f: impl Fn(MockTask) -> MockTask) -> Self {
        Self {
            trend: f(self.trend),
            market: f(self.market),
            competition: f(self.competition),
            profit: f(self.profit),
        }
    }

    pub fn all(&self) -> [&MockTask; 4] {
        [&self.trend, &self.market, &self.competition, &self.profit]
    }

    pub fn task_set(&self) -> TaskSet {
        TaskSet::new(
            self.trend.shared(),
            self.market.shared(),
            self.competition.shared(),
            self.profit.shared(),
        )
        .unwrap()
    }

    pub fn total_calls(&self) -> u32 {
        self.all().iter().map(|t| t.calls()).sum()
    }
}

pub fn fields() -> RequestFields {
    RequestFields::new("bamboo cutting board", "US", "fba", "medium")
        .with_keywords(["kitchen", "eco friendly"])
}

/// Short timeout, no retry delay.
pub fn test_config() -> PipelineConfig {
    PipelineConfig::new()
        .with_timeout_seconds(2.0)
        .with_max_retries(3)
        .with_retry_delay_ms(0)
}

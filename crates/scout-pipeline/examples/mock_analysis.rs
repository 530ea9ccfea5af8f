//! Runs the full pipeline against canned analysis tasks.
//!
//! The competition task always fails, so the report shows a degraded
//! evaluation with renormalized weights.
//!
//! ```sh
//! cargo run --example mock_analysis
//! RUST_LOG=scout_pipeline=debug cargo run --example mock_analysis
//! ```

use async_trait::async_trait;
use scout_pipeline::observability::{self, ObservabilityConfig};
use scout_pipeline::{
    AgentError, AnalysisRequest, AnalysisResult, AnalysisTask, ChannelObserver, Dimension,
    InMemoryHistory, PipelineConfig, PipelineRunner, RequestFields, Session, TaskSet,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct CannedTask {
    dimension: Dimension,
    score: Option<u8>,
    latency: Duration,
}

#[async_trait]
impl AnalysisTask for CannedTask {
    fn dimension(&self) -> Dimension {
        self.dimension
    }

    async fn execute(
        &self,
        request: &AnalysisRequest,
        _session: &Session,
    ) -> Result<AnalysisResult, AgentError> {
        tokio::time::sleep(self.latency).await;

        let Some(score) = self.score else {
            return Err(AgentError::ExecutionFailed(
                "competitor data source returned 503".into(),
            ));
        };

        Ok(AnalysisResult::new(
            self.dimension,
            score,
            format!(
                "{} outlook for {} in {}",
                self.dimension.title(),
                request.category(),
                request.target_market()
            ),
        )
        .with_highlights(request.all_keywords().iter().map(|k| format!("keyword: {}", k)))
        .with_details(json!({ "latency_ms": self.latency.as_millis() as u64 })))
    }
}

fn canned(dimension: Dimension, score: Option<u8>, latency_ms: u64) -> Arc<CannedTask> {
    Arc::new(CannedTask {
        dimension,
        score,
        latency: Duration::from_millis(latency_ms),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::from_env()?;
    observability::init(ObservabilityConfig::from_log_level(&config.log_level)?)?;

    let tasks = TaskSet::new(
        canned(Dimension::Trend, Some(80), 300),
        canned(Dimension::Market, Some(70), 450),
        canned(Dimension::Competition, None, 100),
        canned(Dimension::Profit, Some(90), 250),
    )?;

    let (observer, mut events) = ChannelObserver::new(32);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!(
                "[{:>6.2}s] {:<10} {}",
                event.elapsed_seconds(),
                event.phase,
                event.message
            );
        }
    });

    let history = Arc::new(InMemoryHistory::new(config.history_capacity));
    let mut runner = PipelineRunner::new(config, tasks)?
        .with_observer(Arc::new(observer))
        .with_history(history.clone());

    let fields = RequestFields::new("Bamboo Cutting Board", "us", "FBA", "Medium")
        .with_keywords(["kitchen", "eco friendly"]);

    match runner.analyze(fields, "demo-user").await {
        Ok(result) => {
            println!();
            println!("{}", result.report_text().unwrap_or_default());
            println!();
            println!("Execution time: {:?}", result.execution_time);
            for (phase, elapsed) in result.phase_times.iter() {
                println!("  {:<10} {:?}", phase, elapsed);
            }
        }
        Err(err) => {
            eprintln!("{}", err);
            eprintln!("{}", err.user_message());
        }
    }

    drop(runner);
    printer.await?;

    println!("History entries: {}", history.len());
    Ok(())
}

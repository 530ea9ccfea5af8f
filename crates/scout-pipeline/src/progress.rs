//! Best-effort progress notifications.
//!
//! Observers are a side channel. Delivery never blocks the pipeline, and a
//! failing or panicking observer never affects the result of a run.

use crate::orchestrator::state::Phase;
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A phase transition, as seen by an observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    /// Time since the run started.
    pub elapsed: Duration,
    pub message: String,
}

impl ProgressEvent {
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Receives progress events.
///
/// Implementations must return quickly; they are called inline on the
/// orchestrator's task.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Forwards events into a bounded channel, dropping them when it is full or closed.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::Sender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        match self.sender.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!(phase = %event.phase, "Progress channel full, event dropped");
            }
            Err(TrySendError::Closed(event)) => {
                debug!(phase = %event.phase, "Progress channel closed, event dropped");
            }
        }
    }
}

/// Emits events for one run, stamping each with the elapsed time.
#[derive(Clone)]
pub struct ProgressEmitter {
    observer: Option<Arc<dyn ProgressObserver>>,
    started: Instant,
}

impl ProgressEmitter {
    pub fn new(observer: Option<Arc<dyn ProgressObserver>>, started: Instant) -> Self {
        Self { observer, started }
    }

    /// An emitter that drops every event.
    pub fn disabled() -> Self {
        Self::new(None, Instant::now())
    }

    pub fn is_enabled(&self) -> bool {
        self.observer.is_some()
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    /// Emits the standard description of `phase`.
    pub fn phase_entered(&self, phase: Phase) {
        self.emit(phase, phase.description());
    }

    pub fn emit(&self, phase: Phase, message: impl Into<String>) {
        let Some(observer) = &self.observer else {
            return;
        };
        let event = ProgressEvent {
            phase,
            elapsed: self.started.elapsed(),
            message: message.into(),
        };
        if catch_unwind(AssertUnwindSafe(|| observer.on_progress(&event))).is_err() {
            warn!(phase = %phase, "Progress observer panicked; event discarded");
        }
    }
}

impl std::fmt::Debug for ProgressEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressEmitter")
            .field("enabled", &self.is_enabled())
            .field("started", &self.started)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_channel_observer_delivers_in_order() {
        let (observer, mut rx) = ChannelObserver::new(8);
        let emitter = ProgressEmitter::new(Some(Arc::new(observer)), Instant::now());

        emitter.phase_entered(Phase::Parallel);
        emitter.phase_entered(Phase::Evaluation);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.phase, Phase::Parallel);
        assert_eq!(first.message, Phase::Parallel.description());
        assert_eq!(second.phase, Phase::Evaluation);
        assert!(second.elapsed >= first.elapsed);
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let (observer, mut rx) = ChannelObserver::new(1);
        let emitter = ProgressEmitter::new(Some(Arc::new(observer)), Instant::now());

        emitter.phase_entered(Phase::Parallel);
        emitter.phase_entered(Phase::Evaluation);

        assert_eq!(rx.recv().await.unwrap().phase, Phase::Parallel);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (observer, rx) = ChannelObserver::new(4);
        drop(rx);
        let emitter = ProgressEmitter::new(Some(Arc::new(observer)), Instant::now());

        emitter.phase_entered(Phase::Done);
    }

    #[test]
    fn test_closure_observer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer = move |event: &ProgressEvent| sink.lock().unwrap().push(event.phase);
        let emitter = ProgressEmitter::new(Some(Arc::new(observer)), Instant::now());

        emitter.emit(Phase::Report, "writing");

        assert_eq!(*seen.lock().unwrap(), [Phase::Report]);
    }

    fn panicking_observer(_: &ProgressEvent) {
        panic!("observer bug");
    }

    #[test]
    fn test_panicking_observer_is_contained() {
        let emitter = ProgressEmitter::new(Some(Arc::new(panicking_observer)), Instant::now());

        emitter.phase_entered(Phase::Parallel);
        emitter.phase_entered(Phase::Evaluation);
    }

    #[test]
    fn test_disabled_emitter() {
        let emitter = ProgressEmitter::disabled();
        assert!(!emitter.is_enabled());
        emitter.phase_entered(Phase::Parallel);
    }
}

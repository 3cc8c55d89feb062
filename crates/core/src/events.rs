//! Event model and sink for batch runs.
//!
//! The runner never touches presentation state. Everything a front-end shows
//! arrives as an ordered stream of [`JobEvent`]s over an unbounded channel, so
//! the producing worker never blocks on a slow consumer.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Debug,
    Error,
}

impl LogLevel {
    /// Convert level to the lowercase name used in output
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Error => "error",
        }
    }

    fn as_log_level(self) -> log::Level {
        match self {
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Error => log::Level::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a batch run.
///
/// Owned by the worker; front-ends only see copies delivered as [`JobEvent::State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    StoppingRequested,
    Finished,
}

impl RunState {
    /// Convert state to string for display
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::StoppingRequested => "stopping",
            RunState::Finished => "finished",
        }
    }

    /// True while the worker may still start or finish a file.
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Running | RunState::StoppingRequested)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event emitted by a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Human-readable log line.
    Log {
        timestamp_unix_ms: i64,
        level: LogLevel,
        text: String,
    },
    /// Overall batch progress, 0.0 to 100.0.
    Progress { percent: f64 },
    /// Short progress label such as `"3/10"` or `"Done"`.
    ProgressLabel { text: String },
    /// Mirrored copy of the worker's run state.
    State { state: RunState },
}

impl JobEvent {
    /// Build a log event stamped with the current time.
    pub fn log(level: LogLevel, text: impl Into<String>) -> Self {
        JobEvent::Log {
            timestamp_unix_ms: current_timestamp_ms(),
            level,
            text: text.into(),
        }
    }
}

/// Batch progress as seen by the runner.
///
/// Non-decreasing within a run, except for [`ProgressState::reset`] at run start
/// and [`ProgressState::finish`] at run end.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressState {
    pub completed: usize,
    pub total: usize,
    pub percent: f64,
    pub label: String,
}

/// Label shown once a run has finished.
pub const DONE_LABEL: &str = "Done";

impl Default for ProgressState {
    fn default() -> Self {
        Self::reset(0)
    }
}

impl ProgressState {
    /// Progress at the start of a run over `total` files.
    pub fn reset(total: usize) -> Self {
        Self {
            completed: 0,
            total,
            percent: 0.0,
            label: format!("0/{}", total),
        }
    }

    /// Record that `completed` files (1-indexed ordinal) are done.
    pub fn advance(&mut self, completed: usize) {
        let completed = completed.clamp(self.completed, self.total);
        self.completed = completed;
        self.percent = if self.total == 0 {
            100.0
        } else {
            (completed as f64 / self.total as f64) * 100.0
        };
        self.label = format!("{}/{}", completed, self.total);
    }

    /// Force the terminal state, including after an early stop.
    pub fn finish(&mut self) {
        self.completed = self.total;
        self.percent = 100.0;
        self.label = DONE_LABEL.to_string();
    }
}

/// Producer side of the event channel.
///
/// Cloneable and non-blocking. Every event is also mirrored to the `log` facade,
/// so a run stays diagnosable when nobody consumes the stream.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl EventSink {
    /// Emit an event. A closed consumer is not an error for the producer.
    pub fn emit(&self, event: JobEvent) {
        mirror_to_log(&event);
        let _ = self.tx.send(event);
    }

    pub fn log(&self, level: LogLevel, text: impl Into<String>) {
        self.emit(JobEvent::log(level, text));
    }

    pub fn info(&self, text: impl Into<String>) {
        self.log(LogLevel::Info, text);
    }

    pub fn debug(&self, text: impl Into<String>) {
        self.log(LogLevel::Debug, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.log(LogLevel::Error, text);
    }

    /// Emit the progress value and label of `progress` as two ordered events.
    pub fn progress(&self, progress: &ProgressState) {
        self.emit(JobEvent::Progress {
            percent: progress.percent,
        });
        self.label(&progress.label);
    }

    pub fn label(&self, text: &str) {
        self.emit(JobEvent::ProgressLabel {
            text: text.to_string(),
        });
    }

    pub fn state(&self, state: RunState) {
        self.emit(JobEvent::State { state });
    }

    /// True once the consuming side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// A handle that does not keep the channel open on its own.
    pub fn downgrade(&self) -> WeakEventSink {
        WeakEventSink {
            tx: self.tx.downgrade(),
        }
    }
}

/// Non-owning sink; see [`EventSink::downgrade`].
#[derive(Debug, Clone)]
pub struct WeakEventSink {
    tx: mpsc::WeakUnboundedSender<JobEvent>,
}

impl WeakEventSink {
    /// The live sink, or `None` once every owning sink is gone.
    pub fn upgrade(&self) -> Option<EventSink> {
        self.tx.upgrade().map(|tx| EventSink { tx })
    }
}

/// Consumer side of the event channel.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<JobEvent>,
}

impl EventStream {
    /// Wait for the next event; `None` once every sink is dropped and the queue is empty.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        self.rx.recv().await
    }

    /// Blocking variant of [`EventStream::recv`] for non-async consumers.
    ///
    /// Panics if called from within an async runtime, like the underlying channel.
    pub fn blocking_recv(&mut self) -> Option<JobEvent> {
        self.rx.blocking_recv()
    }

    /// Next pending event without waiting.
    pub fn try_recv(&mut self) -> Option<JobEvent> {
        self.rx.try_recv().ok()
    }

    /// All events pending right now, in emission order.
    pub fn drain(&mut self) -> Vec<JobEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Create a connected sink/stream pair.
pub fn event_channel() -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, EventStream { rx })
}

fn mirror_to_log(event: &JobEvent) {
    match event {
        JobEvent::Log { level, text, .. } => {
            log::log!(target: "batch_transcoder::events", level.as_log_level(), "{}", text)
        }
        JobEvent::Progress { percent } => {
            log::trace!(target: "batch_transcoder::events", "progress {:.1}%", percent)
        }
        JobEvent::ProgressLabel { text } => {
            log::trace!(target: "batch_transcoder::events", "progress label {}", text)
        }
        JobEvent::State { state } => {
            log::debug!(target: "batch_transcoder::events", "run state -> {}", state)
        }
    }
}

/// Get current timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_progress_reset_and_finish() {
        let mut progress = ProgressState::reset(4);
        assert_eq!(progress.completed, 0);
        assert_eq!(progress.percent, 0.0);
        assert_eq!(progress.label, "0/4");

        progress.advance(1);
        assert_eq!(progress.label, "1/4");
        assert!((progress.percent - 25.0).abs() < 1e-9);

        progress.finish();
        assert_eq!(progress.completed, 4);
        assert_eq!(progress.percent, 100.0);
        assert_eq!(progress.label, "Done");
    }

    #[test]
    fn test_progress_finish_after_early_stop() {
        let mut progress = ProgressState::reset(10);
        progress.advance(3);
        progress.finish();
        assert_eq!(progress.percent, 100.0);
        assert_eq!(progress.label, DONE_LABEL);
    }

    // Progress never moves backwards and stays within 0..=100.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_progress_is_monotonic(
            total in 1usize..50,
            steps in proptest::collection::vec(0usize..60, 1..20),
        ) {
            let mut progress = ProgressState::reset(total);
            let mut last = progress.percent;
            for step in steps {
                progress.advance(step);
                prop_assert!(progress.percent >= last);
                prop_assert!(progress.percent <= 100.0);
                prop_assert!(progress.completed <= total);
                last = progress.percent;
            }
        }
    }

    #[test]
    fn test_events_arrive_in_order() {
        let (sink, mut stream) = event_channel();
        sink.info("first");
        sink.progress(&ProgressState::reset(2));
        sink.error("second");
        sink.state(RunState::Finished);

        let events = stream.drain();
        assert_eq!(events.len(), 5);
        assert!(matches!(&events[0], JobEvent::Log { level: LogLevel::Info, text, .. } if text == "first"));
        assert_eq!(events[1], JobEvent::Progress { percent: 0.0 });
        assert_eq!(
            events[2],
            JobEvent::ProgressLabel {
                text: "0/2".to_string()
            }
        );
        assert!(matches!(&events[3], JobEvent::Log { level: LogLevel::Error, text, .. } if text == "second"));
        assert_eq!(
            events[4],
            JobEvent::State {
                state: RunState::Finished
            }
        );
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn test_emit_after_consumer_dropped() {
        let (sink, stream) = event_channel();
        drop(stream);
        assert!(sink.is_closed());
        // Must not panic
        sink.info("nobody listening");
    }

    #[test]
    fn test_log_event_serializes_with_tag() {
        let event = JobEvent::Log {
            timestamp_unix_ms: 1_700_000_000_000,
            level: LogLevel::Error,
            text: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "log");
        assert_eq!(json["level"], "error");
        assert_eq!(json["text"], "boom");

        let state = serde_json::to_value(JobEvent::State {
            state: RunState::StoppingRequested,
        })
        .unwrap();
        assert_eq!(state["state"], "stopping_requested");
    }

    #[tokio::test]
    async fn test_recv_ends_when_sinks_dropped() {
        let (sink, mut stream) = event_channel();
        let producer = sink.clone();
        drop(sink);
        producer.debug("only");
        drop(producer);

        assert!(matches!(stream.recv().await, Some(JobEvent::Log { .. })));
        assert!(stream.recv().await.is_none());
    }

    #[test]
    fn test_weak_sink_does_not_keep_channel_open() {
        let (sink, mut stream) = event_channel();
        let weak = sink.downgrade();
        weak.upgrade().unwrap().info("via weak");
        drop(sink);

        assert!(weak.upgrade().is_none());
        assert_eq!(stream.drain().len(), 1);
        assert!(stream.blocking_recv().is_none());
    }

    #[test]
    fn test_current_timestamp_ms() {
        let ts = current_timestamp_ms();
        // Should be a reasonable timestamp (after year 2020)
        assert!(ts > 1577836800000);
    }
}

//! Batch runner: the sequential per-file loop behind every front-end.
//!
//! A [`BatchRunner`] processes the video files of one folder strictly one after
//! another. It owns its [`RunState`] and reports everything through an
//! [`EventSink`]; front-ends never share state with it. Stopping is cooperative:
//! a request through the [`StopHandle`] moves a running batch to
//! `StoppingRequested` straight away, but the worker only acts on it before the
//! next file starts, so an encode in flight always runs to completion.

use crate::encode::{run_encoder, EncodeError, EncodeParams, Encoder};
use crate::events::{EventSink, ProgressState, RunState, WeakEventSink};
use crate::output_path::allocate_output_path;
use crate::replace::{discard_partial_output, finalize_success, ReplaceError};
use crate::request::{BatchJobRequest, RequestError};
use crate::scan::{scan_directory, ScanError, VideoFile};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

/// Logged once when a stop is first requested
pub const STOP_REQUESTED_MESSAGE: &str = "Stop requested; will finish current file then stop.";

/// Logged when a directory holds no video files
pub const NO_VIDEO_FILES_MESSAGE: &str = "No video files found in folder.";

/// Errors that end a run as a whole.
///
/// Per-file problems never show up here; they are reported as error events and
/// counted in the [`RunSummary`].
#[derive(Debug, Error)]
pub enum RunError {
    /// The request was rejected before any work started
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    /// `start` was called on a runner that already left `Idle`
    #[error("Batch already started (state: {0})")]
    AlreadyStarted(RunState),

    /// The folder disappeared between validation and scanning
    #[error("Directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// The background worker panicked or was cancelled
    #[error("Batch worker failed: {0}")]
    WorkerPanicked(String),
}

impl From<ScanError> for RunError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::DirectoryNotFound(path) => RunError::DirectoryNotFound(path),
        }
    }
}

#[derive(Debug, Default)]
struct StopShared {
    requested: AtomicBool,
    // State changes and their events happen under this lock so the mirrored
    // sequence always ends with `Finished`
    state: Mutex<RunState>,
}

/// Cooperative cancellation flag shared between a runner and its front-end.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    shared: Arc<StopShared>,
    sink: Option<WeakEventSink>,
}

impl StopHandle {
    /// A detached handle that reports nothing when triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that logs the first stop request to `sink`.
    ///
    /// Only a weak reference is kept, so the handle never holds the event
    /// stream open after the runner is gone.
    pub fn with_sink(sink: &EventSink) -> Self {
        Self {
            shared: Arc::default(),
            sink: Some(sink.downgrade()),
        }
    }

    /// Ask the runner to stop before its next file.
    ///
    /// A running batch moves to `StoppingRequested` immediately, even while an
    /// encode is in flight. Returns `true` for the call that actually set the flag.
    pub fn request_stop(&self) -> bool {
        let mut state = self.lock_state();
        let first = !self.shared.requested.swap(true, Ordering::SeqCst);
        if !first {
            return false;
        }

        let sink = self.sink.as_ref().and_then(WeakEventSink::upgrade);
        if let Some(sink) = &sink {
            sink.info(STOP_REQUESTED_MESSAGE);
        }
        if *state == RunState::Running {
            *state = RunState::StoppingRequested;
            if let Some(sink) = &sink {
                sink.state(RunState::StoppingRequested);
            }
        }
        true
    }

    pub fn is_requested(&self) -> bool {
        self.shared.requested.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Counters for one finished run, returned to whoever started it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    /// Files found by the scan
    pub total: usize,
    /// Files the encoder was started for
    pub processed: usize,
    /// Encodes that produced an output (source deleted or not)
    pub succeeded: usize,
    /// Files whose source was kept because the encode failed
    pub failed: usize,
    /// Successful encodes whose source could not be deleted
    pub delete_failures: usize,
    /// The run stopped on request before all files were processed
    pub stopped_early: bool,
}

impl RunSummary {
    fn new(run_id: &str, total: usize) -> Self {
        Self {
            run_id: run_id.to_string(),
            total,
            processed: 0,
            succeeded: 0,
            failed: 0,
            delete_failures: 0,
            stopped_early: false,
        }
    }

    /// True if any file failed or left its source behind.
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.delete_failures > 0
    }
}

/// Single-use state machine: `Idle -> Running -> [StoppingRequested] -> Finished`.
pub struct BatchRunner<E: Encoder> {
    encoder: E,
    sink: EventSink,
    stop: StopHandle,
    progress: ProgressState,
    run_id: String,
}

impl<E: Encoder> BatchRunner<E> {
    pub fn new(encoder: E, sink: EventSink) -> Self {
        let stop = StopHandle::with_sink(&sink);
        Self {
            encoder,
            sink,
            stop,
            progress: ProgressState::default(),
            run_id: Uuid::new_v4().to_string(),
        }
    }

    /// Handle for requesting a cooperative stop from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> RunState {
        *self.stop.lock_state()
    }

    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run the whole batch on the calling thread.
    ///
    /// Blocks while each encoder process runs. Only request validation, a second
    /// call and a vanished folder are errors; every other outcome is reported as
    /// events and in the returned summary.
    pub fn start(&mut self, request: &BatchJobRequest) -> Result<RunSummary, RunError> {
        let state = self.state();
        if state != RunState::Idle {
            return Err(RunError::AlreadyStarted(state));
        }
        request.validate()?;

        self.set_state(RunState::Running);
        self.sink.info(format!(
            "Starting batch {} in {}",
            self.run_id,
            request.directory.display()
        ));

        let files = match scan_directory(&request.directory) {
            Ok(files) => files,
            Err(err) => {
                self.sink.error(err.to_string());
                let summary = RunSummary::new(&self.run_id, 0);
                self.finish(&summary);
                return Err(err.into());
            }
        };

        let mut summary = RunSummary::new(&self.run_id, files.len());
        if files.is_empty() {
            self.sink.error(NO_VIDEO_FILES_MESSAGE);
            self.finish(&summary);
            return Ok(summary);
        }

        let total = files.len();
        self.sink.info(format!("Found {} video file(s)", total));
        self.progress = ProgressState::reset(total);
        self.sink.progress(&self.progress);

        for (index, file) in files.iter().enumerate() {
            if self.stop.is_requested() {
                self.enter_stopping();
                self.sink.info("Stopping before next file.");
                summary.stopped_early = true;
                break;
            }

            let ordinal = index + 1;
            self.process_file(ordinal, total, file, request, &mut summary);

            self.progress.advance(ordinal);
            // The last file's 100% is reported by the terminal event
            if ordinal < total {
                self.sink.progress(&self.progress);
            } else {
                self.sink.label(&self.progress.label);
            }
        }

        self.finish(&summary);
        Ok(summary)
    }

    fn process_file(
        &self,
        ordinal: usize,
        total: usize,
        file: &VideoFile,
        request: &BatchJobRequest,
        summary: &mut RunSummary,
    ) {
        let name = file.file_name();
        self.sink
            .info(format!("[{}/{}] Processing: {}", ordinal, total, name));

        let output = allocate_output_path(&file.path, request.extension());
        let params = EncodeParams {
            executable: request.encoder_path.clone(),
            preset: request.preset().to_string(),
            presets_file: request.presets_file.clone(),
            input: file.path.clone(),
            output: output.clone(),
        };
        self.sink
            .debug(format!("Running: {}", self.encoder.describe(&params)));

        summary.processed += 1;
        match run_encoder(&self.encoder, &params) {
            Ok(outcome) => match finalize_success(&file.path, &output) {
                Ok(()) => {
                    summary.succeeded += 1;
                    self.sink.info(format!(
                        "Success: {} -> {} ({:.1}s)",
                        name,
                        display_name(&output),
                        outcome.elapsed.as_secs_f64()
                    ));
                    self.sink.info(format!("Deleted source: {}", name));
                }
                Err(err @ ReplaceError::DeleteFailed { .. }) => {
                    summary.succeeded += 1;
                    summary.delete_failures += 1;
                    self.sink.info(format!(
                        "Success: {} -> {}",
                        name,
                        display_name(&output)
                    ));
                    self.sink.error(err.to_string());
                }
                Err(err) => {
                    summary.failed += 1;
                    self.sink.error(format!("Failed: {}: {}", name, err));
                }
            },
            Err(err) => {
                summary.failed += 1;
                let mut text = format!("Failed: {}: {}", name, err);
                if let EncodeError::EncodeFailed { output, .. } = &err {
                    let captured = output.trim_end();
                    if !captured.is_empty() {
                        text.push('\n');
                        text.push_str(captured);
                    }
                }
                self.sink.error(text);

                match discard_partial_output(&output) {
                    Ok(true) => self.sink.info(format!(
                        "Removed partial output: {}",
                        display_name(&output)
                    )),
                    Ok(false) => {}
                    Err(err) => self.sink.error(err.to_string()),
                }
            }
        }
    }

    /// Terminal sequence shared by every path that reaches `Finished`.
    fn finish(&mut self, summary: &RunSummary) {
        self.progress.finish();
        self.sink.progress(&self.progress);

        if summary.stopped_early {
            self.sink.info(format!(
                "Processing stopped early: {} of {} file(s) processed.",
                summary.processed, summary.total
            ));
        } else {
            self.sink.info(format!(
                "Processing finished: {} succeeded, {} failed.",
                summary.succeeded, summary.failed
            ));
        }
        self.set_state(RunState::Finished);
    }

    fn set_state(&mut self, state: RunState) {
        let mut current = self.stop.lock_state();
        *current = state;
        self.sink.state(state);
    }

    /// Mirror a stop request that arrived before the batch was running.
    fn enter_stopping(&mut self) {
        let mut current = self.stop.lock_state();
        if *current == RunState::Running {
            *current = RunState::StoppingRequested;
            self.sink.state(RunState::StoppingRequested);
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

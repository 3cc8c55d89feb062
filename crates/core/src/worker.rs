//! Background execution of a batch run.
//!
//! The runner blocks on each encoder process, so it is moved onto tokio's
//! blocking pool while the caller keeps the event stream and stop handle.

use crate::encode::Encoder;
use crate::events::{event_channel, EventStream};
use crate::request::BatchJobRequest;
use crate::runner::{BatchRunner, RunError, RunSummary, StopHandle};
use tokio::task::JoinHandle;

/// A batch running in the background.
pub struct BatchHandle {
    /// Ordered events of the run; closes once the worker is done
    pub events: EventStream,
    /// Cooperative stop for the run
    pub stop: StopHandle,
    run_id: String,
    task: JoinHandle<Result<RunSummary, RunError>>,
}

impl BatchHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// True once the worker has returned.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the worker and return its summary.
    pub async fn wait(self) -> Result<RunSummary, RunError> {
        self.task
            .await
            .map_err(|e| RunError::WorkerPanicked(e.to_string()))?
    }
}

/// Validate `request` and start it on the blocking pool.
///
/// Validation happens before anything is spawned, so an invalid request is
/// returned here and produces no events. Must be called from within a tokio
/// runtime.
pub fn spawn_batch<E>(request: BatchJobRequest, encoder: E) -> Result<BatchHandle, RunError>
where
    E: Encoder + 'static,
{
    request.validate()?;

    let (sink, events) = event_channel();
    let mut runner = BatchRunner::new(encoder, sink);
    let stop = runner.stop_handle();
    let run_id = runner.run_id().to_string();

    let task = tokio::task::spawn_blocking(move || runner.start(&request));

    Ok(BatchHandle {
        events,
        stop,
        run_id,
        task,
    })
}

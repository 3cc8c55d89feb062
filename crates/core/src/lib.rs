//! Batch Transcoder
//!
//! Sequentially transcodes every video file in a folder with HandBrakeCLI,
//! deleting each source only after its output is verified. Front-ends submit a
//! [`BatchJobRequest`] and consume the ordered [`JobEvent`] stream.

pub mod encode;
pub mod events;
pub mod output_path;
pub mod presets;
pub mod replace;
pub mod request;
pub mod runner;
pub mod scan;
pub mod startup;
pub mod worker;

pub use batch_transcoder_config as config;
pub use batch_transcoder_config::Config;
pub use encode::{
    build_handbrake_command, run_encoder, EncodeError, EncodeOutcome, EncodeParams, Encoder,
    HandBrakeCli,
};
pub use events::{
    current_timestamp_ms, event_channel, EventSink, EventStream, JobEvent, LogLevel,
    ProgressState, RunState, DONE_LABEL,
};
pub use output_path::{allocate_output_path, OUTPUT_SUFFIX};
pub use presets::{
    default_preset_name, discover_presets, parse_preset_list, select_preset, PresetError,
    PresetSelection,
};
pub use replace::{discard_partial_output, finalize_success, ReplaceError};
pub use request::{BatchJobRequest, RequestError};
pub use runner::{BatchRunner, RunError, RunSummary, StopHandle};
pub use scan::{scan_directory, ScanError, VideoFile, VIDEO_EXTENSIONS};
pub use startup::{
    check_encoder_available, check_presets_file, resolve_encoder_path, run_startup_checks,
    StartupError,
};
pub use worker::{spawn_batch, BatchHandle};

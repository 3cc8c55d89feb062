//! CLI entry point for the batch transcoder
//!
//! `run` transcodes a folder and prints the event stream; Ctrl-C asks the
//! worker to stop after the current file. `presets` lists what HandBrakeCLI
//! offers.

use batch_transcoder::{
    default_preset_name, discover_presets, resolve_encoder_path, run_startup_checks,
    select_preset, spawn_batch, BatchJobRequest, Config, HandBrakeCli, JobEvent, LogLevel,
    PresetSelection, RunSummary,
};
use chrono::TimeZone;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Batch Transcoder - transcode every video in a folder with HandBrakeCLI
#[derive(Parser, Debug)]
#[command(name = "batch-transcode")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (missing file = defaults)
    #[arg(short, long, global = true, default_value = "transcoder.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transcode every video file directly inside a folder
    Run(RunArgs),
    /// List the presets HandBrakeCLI knows about
    Presets(EncoderArgs),
}

#[derive(Args, Debug, Default)]
struct EncoderArgs {
    /// HandBrakeCLI executable, as a name on PATH or a path
    #[arg(long)]
    encoder: Option<String>,

    /// Presets JSON imported with --preset-import-file
    #[arg(long)]
    presets_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Folder whose video files are transcoded
    directory: PathBuf,

    #[command(flatten)]
    encoder: EncoderArgs,

    /// Preset name passed to HandBrakeCLI with -Z
    #[arg(short = 'Z', long)]
    preset: Option<String>,

    /// Output container extension
    #[arg(short, long)]
    extension: Option<String>,

    /// Print events as JSON lines
    #[arg(long, default_value = "false")]
    json: bool,

    /// Also print debug events (encoder command lines)
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Skip startup checks (HandBrakeCLI --version, presets file)
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let mut config = match Config::load_or_default(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Run(args) => {
            apply_encoder_args(&mut config, &args.encoder);
            if let Some(preset) = &args.preset {
                config.encoder.preset = Some(preset.clone());
            }
            if let Some(extension) = &args.extension {
                config.output.extension = extension.clone();
            }
            run(config, args).await
        }
        Command::Presets(args) => {
            apply_encoder_args(&mut config, &args);
            list_presets(&config)
        }
    }
}

/// Command-line flags win over environment and file
fn apply_encoder_args(config: &mut Config, args: &EncoderArgs) {
    if let Some(encoder) = &args.encoder {
        config.encoder.path = encoder.clone();
    }
    if let Some(presets_file) = &args.presets_file {
        config.encoder.presets_file = Some(presets_file.clone());
    }
}

async fn run(mut config: Config, args: RunArgs) -> ExitCode {
    let encoder = resolve_encoder_path(&config.encoder.path);
    let presets_file = config.encoder.presets_file.clone();

    if args.skip_checks {
        eprintln!("WARNING: Skipping startup checks (--skip-checks enabled)");
    } else if let Err(e) = run_startup_checks(&encoder, presets_file.as_deref()) {
        // Per-file errors still report a missing encoder, so this does not abort
        eprintln!("WARNING: {}", e);
    }

    let has_preset = config
        .encoder
        .preset
        .as_deref()
        .is_some_and(|p| !p.trim().is_empty());
    if !has_preset {
        if let Some(file) = presets_file.as_deref() {
            match pick_preset(&encoder, file) {
                Some(selection) => {
                    eprintln!(
                        "No preset explicitly selected; using first loaded preset: {}",
                        selection.selected
                    );
                    config.encoder.preset = Some(selection.selected);
                }
                None => eprintln!("No presets found via HandBrakeCLI output."),
            }
        }
    }

    let mut request = BatchJobRequest::from_config(&args.directory, &config);
    request.encoder_path = encoder;

    let mut handle = match spawn_batch(request, HandBrakeCli::new()) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut printer = EventPrinter::new(args.json, args.verbose);
    let mut watch_ctrl_c = true;
    loop {
        tokio::select! {
            event = handle.events.recv() => match event {
                Some(event) => printer.print(&event),
                None => break,
            },
            result = tokio::signal::ctrl_c(), if watch_ctrl_c => match result {
                Ok(()) => {
                    if !handle.stop.request_stop() {
                        eprintln!("Already stopping; waiting for the current file to finish.");
                    }
                }
                Err(e) => {
                    log::warn!("Ctrl-C handler unavailable: {}", e);
                    watch_ctrl_c = false;
                }
            }
        }
    }

    match handle.wait().await {
        Ok(summary) => {
            printer.print_summary(&summary);
            if summary.has_failures() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn list_presets(config: &Config) -> ExitCode {
    let encoder = resolve_encoder_path(&config.encoder.path);
    let presets_file = config.encoder.presets_file.as_deref();

    let presets = match discover_presets(&encoder, presets_file) {
        Ok(presets) => presets,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let default = config
        .encoder
        .preset
        .clone()
        .or_else(|| presets_file.and_then(default_preset_name));
    match select_preset(presets, default.as_deref()) {
        Some(selection) => {
            for preset in &selection.presets {
                let marker = if *preset == selection.selected { '*' } else { ' ' };
                println!("{} {}", marker, preset);
            }
            ExitCode::SUCCESS
        }
        None => ExitCode::FAILURE,
    }
}

/// Discover presets including `presets_file` and pick its default
fn pick_preset(encoder: &Path, presets_file: &Path) -> Option<PresetSelection> {
    let presets = match discover_presets(encoder, Some(presets_file)) {
        Ok(presets) => presets,
        Err(e) => {
            log::warn!("{}", e);
            return None;
        }
    };
    let default = default_preset_name(presets_file);
    select_preset(presets, default.as_deref())
}

/// Turns events into terminal lines
struct EventPrinter {
    json: bool,
    verbose: bool,
    percent: f64,
}

impl EventPrinter {
    fn new(json: bool, verbose: bool) -> Self {
        Self {
            json,
            verbose,
            percent: 0.0,
        }
    }

    fn print(&mut self, event: &JobEvent) {
        if let Some(line) = self.render(event) {
            println!("{}", line);
        }
    }

    fn render(&mut self, event: &JobEvent) -> Option<String> {
        if self.json {
            return serde_json::to_string(event).ok();
        }

        match event {
            JobEvent::Log {
                timestamp_unix_ms,
                level,
                text,
            } => {
                if *level == LogLevel::Debug && !self.verbose {
                    return None;
                }
                Some(format!(
                    "[{}] {:<5} {}",
                    format_timestamp(*timestamp_unix_ms),
                    level.as_str().to_uppercase(),
                    text
                ))
            }
            JobEvent::Progress { percent } => {
                self.percent = *percent;
                None
            }
            JobEvent::ProgressLabel { text } => {
                Some(format!("progress: {} ({:.1}%)", text, self.percent))
            }
            JobEvent::State { state } => Some(format!("state: {}", state)),
        }
    }

    fn print_summary(&self, summary: &RunSummary) {
        if self.json {
            if let Ok(line) = serde_json::to_string(summary) {
                println!("{}", line);
            }
            return;
        }
        println!(
            "Summary: {} file(s), {} succeeded, {} failed{}",
            summary.total,
            summary.succeeded,
            summary.failed,
            if summary.stopped_early {
                " (stopped early)"
            } else {
                ""
            }
        );
        if summary.delete_failures > 0 {
            println!("{} source file(s) could not be deleted", summary.delete_failures);
        }
    }
}

/// Local wall-clock time in the log pane format
fn format_timestamp(timestamp_unix_ms: i64) -> String {
    chrono::Local
        .timestamp_millis_opt(timestamp_unix_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "????-??-?? ??:??:??".to_string())
}

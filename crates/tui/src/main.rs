//! Batch Transcoder TUI
//!
//! Terminal front-end for a single batch run: a scrolling log pane, an overall
//! progress gauge and a status bar. `s` asks the worker to stop after the
//! current file; `q` does the same and leaves once the run has finished.

use batch_transcoder::{
    default_preset_name, discover_presets, resolve_encoder_path, select_preset, spawn_batch,
    BatchHandle, BatchJobRequest, Config, HandBrakeCli, JobEvent, LogLevel, RunState,
    RunSummary,
};
use chrono::TimeZone;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table},
    Frame, Terminal,
};
use std::{
    collections::VecDeque,
    io::{self, Stdout},
    path::PathBuf,
    process::ExitCode,
    time::{Duration, Instant},
};

const MAX_LOG_ENTRIES: usize = 500;
const INPUT_POLL_MS: u64 = 50;

/// Batch Transcoder TUI - watch and stop a batch run
#[derive(Parser, Debug)]
#[command(name = "transcode-tui")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Folder whose video files are transcoded
    directory: PathBuf,

    /// Path to the configuration file (missing file = defaults)
    #[arg(short, long, default_value = "transcoder.toml")]
    config: PathBuf,

    /// HandBrakeCLI executable, as a name on PATH or a path
    #[arg(long)]
    encoder: Option<String>,

    /// Presets JSON imported with --preset-import-file
    #[arg(long)]
    presets_file: Option<PathBuf>,

    /// Preset name passed to HandBrakeCLI with -Z
    #[arg(short = 'Z', long)]
    preset: Option<String>,

    /// Output container extension
    #[arg(short, long)]
    extension: Option<String>,
}

// ============================================================================
// App State
// ============================================================================

/// One line of the log pane
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub line: String,
}

/// Everything the screen shows, rebuilt only from events
pub struct App {
    /// Most recent log lines, oldest first
    pub log: VecDeque<LogEntry>,
    /// Overall progress, 0.0 to 100.0
    pub percent: f64,
    /// Progress label such as "3/10" or "Done"
    pub label: String,
    /// Last run state seen on the stream
    pub state: RunState,
    /// Leave once the worker has returned
    pub quit_requested: bool,
    /// Request details shown in the side panel
    details: Vec<(&'static str, String)>,
    /// Counters once the worker has returned
    pub summary: Option<RunSummary>,
}

impl App {
    pub fn new(details: Vec<(&'static str, String)>) -> Self {
        Self {
            log: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            percent: 0.0,
            label: String::new(),
            state: RunState::Idle,
            quit_requested: false,
            details,
            summary: None,
        }
    }

    /// Add a line to the log pane, dropping the oldest beyond the cap
    pub fn push_log(&mut self, level: LogLevel, line: String) {
        if self.log.len() >= MAX_LOG_ENTRIES {
            self.log.pop_front();
        }
        self.log.push_back(LogEntry { level, line });
    }

    /// Fold one event from the worker into the screen state
    pub fn apply(&mut self, event: JobEvent) {
        match event {
            JobEvent::Log {
                timestamp_unix_ms,
                level,
                text,
            } => {
                let stamp = format_timestamp(timestamp_unix_ms);
                for (i, part) in text.lines().enumerate() {
                    let line = if i == 0 {
                        format!("[{}] {}", stamp, part)
                    } else {
                        format!("    {}", part)
                    };
                    self.push_log(level, line);
                }
            }
            JobEvent::Progress { percent } => self.percent = percent.clamp(0.0, 100.0),
            JobEvent::ProgressLabel { text } => self.label = text,
            JobEvent::State { state } => self.state = state,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == RunState::Finished
    }
}

// ============================================================================
// Terminal Setup/Teardown
// ============================================================================

/// Initialize the terminal for TUI rendering
fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Restore terminal to normal state
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

// ============================================================================
// Widget Rendering
// ============================================================================

fn level_style(level: LogLevel) -> Style {
    match level {
        LogLevel::Info => Style::default(),
        LogLevel::Debug => Style::default().fg(Color::DarkGray),
        LogLevel::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

/// Render the log pane, newest lines at the bottom
/// One log entry per row; long lines are clipped so the newest entry always
/// sits on the bottom row.
fn render_log(f: &mut Frame, area: Rect, app: &App) {
    let visible = area.height.saturating_sub(2) as usize;
    let skip = app.log.len().saturating_sub(visible);
    let lines: Vec<Line> = app
        .log
        .iter()
        .skip(skip)
        .map(|entry| Line::from(Span::styled(entry.line.as_str(), level_style(entry.level))))
        .collect();

    let paragraph =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Log "));

    f.render_widget(paragraph, area);
}

/// Render the request details and, once available, the run summary
fn render_details(f: &mut Frame, area: Rect, app: &App) {
    let key_style = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let mut rows: Vec<Row> = app
        .details
        .iter()
        .map(|(key, value)| {
            Row::new(vec![
                Cell::from(*key).style(key_style),
                Cell::from(value.clone()),
            ])
        })
        .collect();

    if let Some(summary) = &app.summary {
        let counts = [
            ("Files", summary.total),
            ("Succeeded", summary.succeeded),
            ("Failed", summary.failed),
            ("Not deleted", summary.delete_failures),
        ];
        for (key, value) in counts {
            rows.push(Row::new(vec![
                Cell::from(key).style(key_style),
                Cell::from(value.to_string()),
            ]));
        }
    }

    let widths = [Constraint::Length(12), Constraint::Min(10)];
    let table = Table::new(rows, widths)
        .block(Block::default().borders(Borders::ALL).title(" Batch "));

    f.render_widget(table, area);
}

/// Render the overall progress gauge
fn render_progress(f: &mut Frame, area: Rect, app: &App) {
    let color = if app.is_finished() { Color::Green } else { Color::Cyan };
    let label = if app.label.is_empty() {
        format!("{:.1}%", app.percent)
    } else {
        format!("{} ({:.1}%)", app.label, app.percent)
    };

    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(" Progress "))
        .gauge_style(Style::default().fg(color))
        .ratio((app.percent / 100.0).clamp(0.0, 1.0))
        .label(label);

    f.render_widget(gauge, area);
}

/// Render status bar with run state and key help
fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let keys = match app.state {
        RunState::Finished => "Press 'q' to quit",
        RunState::StoppingRequested => "Stopping after current file | 'q' quits when done",
        _ => "'s' stop after current file | 'q' stop and quit",
    };
    let status = format!(" State: {} | {} ", app.state, keys);

    let paragraph =
        Paragraph::new(status).style(Style::default().fg(Color::White).bg(Color::DarkGray));

    f.render_widget(paragraph, area);
}

/// Local wall-clock time for log lines
fn format_timestamp(timestamp_unix_ms: i64) -> String {
    chrono::Local
        .timestamp_millis_opt(timestamp_unix_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "????-??-?? ??:??:??".to_string())
}

// ============================================================================
// Main UI Layout
// ============================================================================

/// Render the complete UI layout
fn ui(f: &mut Frame, app: &App) {
    let size = f.area();

    // Status bar at the bottom, gauge above it, content on top
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(size);

    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(main_chunks[0]);

    render_log(f, content_chunks[0], app);
    render_details(f, content_chunks[1], app);
    render_progress(f, main_chunks[1], app);
    render_status_bar(f, main_chunks[2], app);
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match Config::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    apply_args(&mut config, &args);

    let encoder = resolve_encoder_path(&config.encoder.path);
    let mut notes = Vec::new();
    if config.encoder.preset.as_deref().map_or(true, |p| p.trim().is_empty()) {
        if let Some(file) = config.encoder.presets_file.clone() {
            match discover_presets(&encoder, Some(file.as_path())) {
                Ok(presets) => {
                    notes.push((
                        LogLevel::Info,
                        format!("Loaded {} presets via HandBrakeCLI", presets.len()),
                    ));
                    let default = default_preset_name(&file);
                    if let Some(selection) = select_preset(presets, default.as_deref()) {
                        notes.push((
                            LogLevel::Info,
                            format!(
                                "No preset explicitly selected; using first loaded preset: {}",
                                selection.selected
                            ),
                        ));
                        config.encoder.preset = Some(selection.selected);
                    }
                }
                Err(e) => notes.push((LogLevel::Error, e.to_string())),
            }
        }
    }

    let mut request = BatchJobRequest::from_config(&args.directory, &config);
    request.encoder_path = encoder;

    let details = vec![
        ("Folder", request.directory.display().to_string()),
        ("Encoder", request.encoder_path.display().to_string()),
        ("Preset", request.preset().to_string()),
        ("Extension", request.extension().to_string()),
    ];

    let handle = match spawn_batch(request, HandBrakeCli::new()) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut app = App::new(details);
    for (level, text) in notes {
        app.apply(JobEvent::log(level, text));
    }

    let poll_interval = Duration::from_millis(config.ui.poll_interval_ms.max(1));
    let outcome = match setup_terminal() {
        Ok(mut terminal) => {
            let result = run_app(&mut terminal, &mut app, handle, poll_interval).await;
            if let Err(e) = restore_terminal(&mut terminal) {
                eprintln!("Failed to restore terminal: {}", e);
            }
            result
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(Some(summary)) => {
            println!(
                "{} file(s): {} succeeded, {} failed{}",
                summary.total,
                summary.succeeded,
                summary.failed,
                if summary.stopped_early { " (stopped early)" } else { "" }
            );
            if summary.has_failures() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Ok(None) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Terminal error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Command-line flags win over environment and file
fn apply_args(config: &mut Config, args: &Args) {
    if let Some(encoder) = &args.encoder {
        config.encoder.path = encoder.clone();
    }
    if let Some(presets_file) = &args.presets_file {
        config.encoder.presets_file = Some(presets_file.clone());
    }
    if let Some(preset) = &args.preset {
        config.encoder.preset = Some(preset.clone());
    }
    if let Some(extension) = &args.extension {
        config.output.extension = extension.clone();
    }
}

/// Main application loop
///
/// Returns the run summary, or `None` if the worker failed.
async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    mut handle: BatchHandle,
    poll_interval: Duration,
) -> io::Result<Option<RunSummary>> {
    let mut last_drain = Instant::now() - poll_interval; // Drain immediately on start

    loop {
        if last_drain.elapsed() >= poll_interval {
            for event in handle.events.drain() {
                app.apply(event);
            }
            last_drain = Instant::now();
        }

        if handle.is_finished() {
            break;
        }

        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(INPUT_POLL_MS))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let ctrl_c = key.code == KeyCode::Char('c')
                        && key.modifiers.contains(KeyModifiers::CONTROL);
                    match key.code {
                        KeyCode::Char('s') | KeyCode::Char('S') => {
                            handle.stop.request_stop();
                        }
                        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                            handle.stop.request_stop();
                            app.quit_requested = true;
                        }
                        _ if ctrl_c => {
                            handle.stop.request_stop();
                            app.quit_requested = true;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    // The worker has returned; keep showing the final screen until asked to quit
    for event in handle.events.drain() {
        app.apply(event);
    }
    let summary = match handle.wait().await {
        Ok(summary) => Some(summary),
        Err(e) => {
            app.push_log(LogLevel::Error, e.to_string());
            None
        }
    };
    app.summary = summary.clone();

    while !app.quit_requested {
        terminal.draw(|f| ui(f, app))?;
        if event::poll(Duration::from_millis(INPUT_POLL_MS))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && matches!(
                        key.code,
                        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc
                    )
                {
                    app.quit_requested = true;
                }
            }
        }
    }

    Ok(summary)
}

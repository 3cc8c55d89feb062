//! End-to-end runs against a shell script that mimics HandBrakeCLI.
#![cfg(unix)]

use batch_transcoder::events::{event_channel, JobEvent, LogLevel, RunState};
use batch_transcoder::{
    check_encoder_available, discover_presets, spawn_batch, BatchJobRequest, BatchRunner,
    HandBrakeCli,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::{tempdir, TempDir};

// Every test that spawns a process holds this; a script written while another
// thread forks can fail to exec with ETXTBSY
static SCRIPT_LOCK: Mutex<()> = Mutex::new(());

const FAKE_HANDBRAKE: &str = r#"#!/bin/sh
import=""
preset=""
input=""
output=""
list=0
while [ $# -gt 0 ]; do
  case "$1" in
    --version) echo "HandBrake 1.7.2"; exit 0 ;;
    --preset-list) list=1 ;;
    --preset-import-file) shift; import="$1" ;;
    -Z) shift; preset="$1" ;;
    -i) shift; input="$1" ;;
    -o) shift; output="$1" ;;
  esac
  shift
done
if [ "$list" = 1 ]; then
  echo "General/:" >&2
  echo "    Fast 1080p30" >&2
  echo "    HQ 720p30 Surround" >&2
  if [ -n "$import" ]; then
    echo "Custom/:" >&2
    echo "    Imported Preset" >&2
  fi
  exit 0
fi
echo "Encoding: task 1 of 1, preset $preset"
case "$input" in
  *fail*)
    printf 'partial' > "$output"
    echo "x264 [error]: corrupt stream" >&2
    exit 3
    ;;
esac
cp "$input" "$output"
echo "Encode done!" >&2
exit 0
"#;

fn install_fake_handbrake(dir: &Path) -> PathBuf {
    let path = dir.join("HandBrakeCLI");
    fs::write(&path, FAKE_HANDBRAKE).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn create_dummy_file(dir: &Path, filename: &str, content: &str) -> PathBuf {
    let path = dir.join(filename);
    fs::write(&path, content).unwrap();
    path
}

fn log_texts(events: &[JobEvent], wanted: LogLevel) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            JobEvent::Log { level, text, .. } if *level == wanted => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn lock() -> std::sync::MutexGuard<'static, ()> {
    SCRIPT_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[test]
fn test_batch_with_fake_handbrake() {
    let _guard = lock();
    let bin_dir = TempDir::new().unwrap();
    let encoder = install_fake_handbrake(bin_dir.path());

    let media = tempdir().unwrap();
    create_dummy_file(media.path(), "a.mp4", "first clip");
    create_dummy_file(media.path(), "b.MKV", "second clip");
    create_dummy_file(media.path(), "notes.txt", "not a video");

    let request = BatchJobRequest::new(media.path(), &encoder, "Fast 1080p30", "mp4");
    let (sink, mut stream) = event_channel();
    let mut runner = BatchRunner::new(HandBrakeCli::new(), sink);
    let summary = runner.start(&request).unwrap();
    drop(runner);

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 2);
    assert!(!summary.has_failures());

    assert_eq!(
        fs::read_to_string(media.path().join("a_transcoded.mp4")).unwrap(),
        "first clip"
    );
    assert_eq!(
        fs::read_to_string(media.path().join("b_transcoded.mp4")).unwrap(),
        "second clip"
    );
    assert!(!media.path().join("a.mp4").exists());
    assert!(!media.path().join("b.MKV").exists());
    assert!(media.path().join("notes.txt").exists());

    let events = stream.drain();
    let debug = log_texts(&events, LogLevel::Debug);
    assert!(debug
        .iter()
        .any(|line| line.contains("-Z \"Fast 1080p30\" -i")));
    assert!(log_texts(&events, LogLevel::Error).is_empty());
}

#[test]
fn test_failed_encode_with_fake_handbrake() {
    let _guard = lock();
    let bin_dir = TempDir::new().unwrap();
    let encoder = install_fake_handbrake(bin_dir.path());

    let media = tempdir().unwrap();
    create_dummy_file(media.path(), "c_fail.avi", "broken clip");
    create_dummy_file(media.path(), "d.mov", "good clip");

    let request = BatchJobRequest::new(media.path(), &encoder, "Fast 1080p30", ".mp4");
    let (sink, mut stream) = event_channel();
    let mut runner = BatchRunner::new(HandBrakeCli::new(), sink);
    let summary = runner.start(&request).unwrap();
    drop(runner);

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 1);

    assert!(media.path().join("c_fail.avi").exists());
    assert!(!media.path().join("c_fail_transcoded.mp4").exists());
    assert!(media.path().join("d_transcoded.mp4").exists());

    let events = stream.drain();
    let errors = log_texts(&events, LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("code 3"));
    assert!(errors[0].contains("x264 [error]: corrupt stream"));
    assert!(errors[0].contains("Encoding: task 1 of 1"));
}

#[test]
fn test_missing_handbrake_keeps_sources() {
    let _guard = lock();
    let media = tempdir().unwrap();
    create_dummy_file(media.path(), "a.mp4", "clip");

    let request = BatchJobRequest::new(
        media.path(),
        media.path().join("no-such-HandBrakeCLI"),
        "Fast 1080p30",
        "mp4",
    );
    let (sink, mut stream) = event_channel();
    let mut runner = BatchRunner::new(HandBrakeCli::new(), sink);
    let summary = runner.start(&request).unwrap();
    drop(runner);

    assert_eq!(summary.failed, 1);
    assert!(media.path().join("a.mp4").exists());
    assert!(!media.path().join("a_transcoded.mp4").exists());

    let errors = log_texts(&stream.drain(), LogLevel::Error);
    assert!(errors[0].contains("Encoder executable not found"));
}

#[test]
fn test_preset_discovery_with_fake_handbrake() {
    let _guard = lock();
    let bin_dir = TempDir::new().unwrap();
    let encoder = install_fake_handbrake(bin_dir.path());

    let presets = discover_presets(&encoder, None).unwrap();
    assert_eq!(presets, vec!["Fast 1080p30", "HQ 720p30 Surround"]);

    let presets_file = create_dummy_file(bin_dir.path(), "custom.json", "{}");
    let presets = discover_presets(&encoder, Some(presets_file.as_path())).unwrap();
    assert_eq!(presets.last().map(String::as_str), Some("Imported Preset"));

    assert_eq!(check_encoder_available(&encoder).unwrap(), "1.7.2");
}

#[tokio::test]
async fn test_spawned_batch_with_fake_handbrake() {
    let _guard = lock();
    let bin_dir = TempDir::new().unwrap();
    let encoder = install_fake_handbrake(bin_dir.path());

    let media = tempdir().unwrap();
    create_dummy_file(media.path(), "a.webm", "clip");

    let request = BatchJobRequest::new(media.path(), &encoder, "HQ 720p30 Surround", "mkv");
    let mut handle = spawn_batch(request, HandBrakeCli::new()).unwrap();

    let mut last_state = None;
    while let Some(event) = handle.events.recv().await {
        if let JobEvent::State { state } = event {
            last_state = Some(state);
        }
    }
    let summary = handle.wait().await.unwrap();

    assert_eq!(last_state, Some(RunState::Finished));
    assert_eq!(summary.succeeded, 1);
    assert!(media.path().join("a_transcoded.mkv").exists());
}

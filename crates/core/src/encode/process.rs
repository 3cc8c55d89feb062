//! Running external processes with stdout and stderr merged into one text.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

/// Exit status and combined output of a finished process
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    /// Exit code, `None` if terminated by a signal
    pub exit_code: Option<i32>,
    /// Lines from stdout and stderr in the order they were read
    pub output: String,
}

/// Run `cmd` to completion, capturing stdout and stderr as one stream
///
/// Both pipes are drained line by line on their own reader threads, so the
/// process can never stall on a full pipe. Lines are joined in arrival order.
/// Non-UTF-8 bytes are replaced rather than rejected.
///
/// # Errors
/// Returns the spawn error if the process could not be started.
pub fn run_with_merged_output(mut cmd: Command) -> io::Result<ProcessOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;

    let (tx, rx) = mpsc::channel::<String>();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_line_reader(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_line_reader(stderr, tx.clone()));
    }
    drop(tx);

    let mut output = String::new();
    for line in rx {
        output.push_str(&line);
        output.push('\n');
    }

    for reader in readers {
        join_reader(reader);
    }

    let status = child.wait()?;

    Ok(ProcessOutput {
        exit_code: status.code(),
        output,
    })
}

fn spawn_line_reader<R>(reader: R, tx: mpsc::Sender<String>) -> thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\r', '\n']).to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Wait for a reader thread; returns `false` if it panicked, in which case
/// the captured output may be truncated.
fn join_reader(reader: thread::JoinHandle<()>) -> bool {
    match reader.join() {
        Ok(()) => true,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::warn!("Output reader thread panicked, output may be truncated: {}", reason);
            false
        }
    }
}

/// Render a command as a single shell-like line for logging
///
/// Arguments containing whitespace are double-quoted.
pub fn command_line(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|part| {
            let part = part.to_string_lossy();
            if part.is_empty() || part.chars().any(char::is_whitespace) {
                format!("\"{}\"", part)
            } else {
                part.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

use crate::domain::ExecOutcome;
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const STREAM_POLL: Duration = Duration::from_millis(50);
const NOT_HANDLED_MARKER: &str = "unknown command";

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        source: io::Error,
    },

    #[error("command exited with {}{}", exit_label(.code), stderr_suffix(.stderr))]
    Failed { code: Option<i32>, stderr: String },

    #[error("failed to read command output: {0}")]
    Io(#[from] io::Error),

    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("execution cancelled")]
    Cancelled,

    #[error("execution worker exited without a result")]
    Disconnected,
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Runs a command to completion and returns everything it printed.
pub trait Executor: Send + Sync {
    fn run(&self, name: &str, args: &[String]) -> Result<ExecOutcome, ExecError>;
}

/// Runs a command and hands each output line to `emit` as it is produced.
///
/// Implementations return once the command finishes. They must also return
/// promptly after `deadline` has elapsed or `cancel` is set, stopping the
/// underlying work first.
pub trait StreamingExecutor: Send + Sync {
    fn stream(
        &self,
        name: &str,
        args: &[String],
        deadline: Duration,
        cancel: &AtomicBool,
        emit: &mut dyn FnMut(String),
    ) -> Result<(), ExecError>;
}

/// Executes catalog commands as `<program> <name> [args...]`.
#[derive(Clone, Debug)]
pub struct ProcessExecutor {
    program: PathBuf,
}

impl ProcessExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, name: &str, args: &[String]) -> Command {
        let mut command = Command::new(&self.program);
        command.arg(name).args(args).stdin(Stdio::null());
        command
    }

    fn spawn_error(&self, source: io::Error) -> ExecError {
        tracing::warn!(program = %self.program.display(), error = %source, "spawn failed");
        ExecError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

impl Executor for ProcessExecutor {
    fn run(&self, name: &str, args: &[String]) -> Result<ExecOutcome, ExecError> {
        let output = self
            .command(name, args)
            .output()
            .map_err(|error| self.spawn_error(error))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            let mut text = stdout;
            if !stderr.trim().is_empty() {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&stderr);
            }
            return Ok(ExecOutcome::Output(text));
        }

        if stderr.to_lowercase().contains(NOT_HANDLED_MARKER) {
            return Ok(ExecOutcome::NotHandled);
        }

        Err(ExecError::Failed {
            code: output.status.code(),
            stderr: stderr.trim().to_string(),
        })
    }
}

impl StreamingExecutor for ProcessExecutor {
    fn stream(
        &self,
        name: &str,
        args: &[String],
        deadline: Duration,
        cancel: &AtomicBool,
        emit: &mut dyn FnMut(String),
    ) -> Result<(), ExecError> {
        let started = Instant::now();
        let mut child = self
            .command(name, args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| self.spawn_error(error))?;

        let (line_tx, line_rx) = mpsc::channel::<String>();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, line_tx.clone());
        }
        drop(line_tx);

        loop {
            if cancel.load(Ordering::Relaxed) {
                kill_child(&mut child);
                return Err(ExecError::Cancelled);
            }
            if started.elapsed() >= deadline {
                kill_child(&mut child);
                return Err(ExecError::Timeout {
                    seconds: deadline.as_secs(),
                });
            }

            match line_rx.recv_timeout(STREAM_POLL) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        emit(line);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(ExecError::Failed {
                code: status.code(),
                stderr: String::new(),
            })
        }
    }
}

fn spawn_line_reader(pipe: impl Read + Send + 'static, tx: Sender<String>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send(trimmed).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
}

fn kill_child(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

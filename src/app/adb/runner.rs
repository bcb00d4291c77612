use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::app::error::AppError;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// stdout and stderr lines interleaved in the order they were read.
    pub lines: Vec<String>,
    pub exit_code: Option<i32>,
}

/// One-shot bridge invocations. Every call starts and reaps its own process.
pub trait CommandRunner: Send + Sync {
    /// Runs `<adb> [-s <serial>] <args...>` and returns the merged output lines.
    fn run(&self, serial: Option<&str>, args: &[String], trace_id: &str)
        -> Result<Vec<String>, AppError>;

    /// Runs an arbitrary host program with the same capture rules as [`CommandRunner::run`].
    fn run_program(&self, program: &str, args: &[String], trace_id: &str)
        -> Result<Vec<String>, AppError>;
}

#[derive(Debug, Clone)]
pub struct AdbRunner {
    program: String,
    timeout: Duration,
}

impl AdbRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self::with_timeout(program, DEFAULT_COMMAND_TIMEOUT)
    }

    pub fn with_timeout(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl CommandRunner for AdbRunner {
    fn run(
        &self,
        serial: Option<&str>,
        args: &[String],
        trace_id: &str,
    ) -> Result<Vec<String>, AppError> {
        let full_args = device_scoped_args(serial, args);
        self.run_program(&self.program, &full_args, trace_id)
    }

    fn run_program(
        &self,
        program: &str,
        args: &[String],
        trace_id: &str,
    ) -> Result<Vec<String>, AppError> {
        let output = run_command_with_timeout(program, args, self.timeout, trace_id)?;
        match output.exit_code {
            Some(0) => Ok(output.lines),
            code => {
                let detail = output
                    .lines
                    .iter()
                    .rev()
                    .find(|line| !line.trim().is_empty())
                    .cloned()
                    .unwrap_or_default();
                Err(AppError::system(
                    format!("{program} exited with code {code:?}: {detail}"),
                    trace_id,
                ))
            }
        }
    }
}

pub fn device_scoped_args(serial: Option<&str>, args: &[String]) -> Vec<String> {
    let mut full_args = Vec::with_capacity(args.len() + 2);
    if let Some(serial) = serial.filter(|serial| !serial.trim().is_empty()) {
        full_args.push("-s".to_string());
        full_args.push(serial.to_string());
    }
    full_args.extend(args.iter().cloned());
    full_args
}

pub fn run_command(
    program: &str,
    args: &[String],
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    run_command_with_timeout(program, args, DEFAULT_COMMAND_TIMEOUT, trace_id)
}

pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    debug!(trace_id = %trace_id, program = %program, args = ?args, "spawning command");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| AppError::system(format!("Failed to spawn command: {err}"), trace_id))?;

    // Drain stdout/stderr in parallel; otherwise, a chatty child process can block once the pipe
    // buffer fills, and we will incorrectly hit the timeout.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stderr", trace_id))?;

    let (tx, rx) = mpsc::channel::<String>();
    let stdout_handle = spawn_line_pump(stdout, tx.clone());
    let stderr_handle = spawn_line_pump(stderr, tx);

    let mut lines = Vec::new();
    let start = Instant::now();
    let exit_code = loop {
        lines.extend(rx.try_iter());
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    return Err(AppError::system("Command timed out".to_string(), trace_id));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                let _ = child.kill();
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(AppError::system(
                    format!("Failed to poll command: {err}"),
                    trace_id,
                ));
            }
        }
    };

    let _ = stdout_handle.join();
    let _ = stderr_handle.join();
    lines.extend(rx.try_iter());

    Ok(CommandOutput { lines, exit_code })
}

fn spawn_line_pump<R: Read + Send + 'static>(reader: R, tx: Sender<String>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buffer = Vec::<u8>::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer);
                    let line = line.trim_end_matches(['\r', '\n']).to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
}

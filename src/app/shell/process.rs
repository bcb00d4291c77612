use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::app::error::AppError;
use crate::app::shell::framing::LineAssembler;

/// A live interactive shell subprocess. Methods take `&self` so the liveness
/// probe can run while a command holds the session lock.
pub trait ShellProcess: Send + Sync {
    /// Writes `line` plus a newline and flushes.
    fn write_line(&self, line: &str) -> io::Result<()>;
    fn is_alive(&self) -> bool;
    /// Best-effort; errors are ignored.
    fn close_streams(&self);
    /// Forceful termination. Safe to call on an exited process.
    fn kill(&self);
}

pub struct SpawnedShell {
    pub process: Arc<dyn ShellProcess>,
    /// stdout and stderr lines, merged. Disconnects once both pipes close.
    pub output: Receiver<String>,
}

pub trait ShellSpawner: Send + Sync {
    fn spawn(&self, serial: &str, trace_id: &str) -> Result<SpawnedShell, AppError>;
}

/// Spawns `<adb> -s <serial> shell`.
#[derive(Debug, Clone)]
pub struct AdbShellSpawner {
    program: String,
}

impl AdbShellSpawner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ShellSpawner for AdbShellSpawner {
    fn spawn(&self, serial: &str, trace_id: &str) -> Result<SpawnedShell, AppError> {
        if serial.trim().is_empty() {
            return Err(AppError::validation("serial is required", trace_id));
        }
        let args = vec!["-s".to_string(), serial.to_string(), "shell".to_string()];
        spawn_interactive(&self.program, &args, trace_id)
    }
}

pub struct PipedShellProcess {
    child: Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
}

pub fn spawn_interactive(
    program: &str,
    args: &[String],
    trace_id: &str,
) -> Result<SpawnedShell, AppError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| AppError::system(format!("Failed to spawn shell: {err}"), trace_id))?;

    let stdin = child.stdin.take();
    let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
        (Some(stdout), Some(stderr)) => (stdout, stderr),
        _ => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AppError::system("Failed to capture shell output", trace_id));
        }
    };

    let (tx, rx) = mpsc::channel::<String>();
    spawn_output_pump(stdout, tx.clone(), trace_id.to_string(), "stdout");
    spawn_output_pump(stderr, tx, trace_id.to_string(), "stderr");
    debug!(trace_id = %trace_id, program = %program, args = ?args, "interactive shell spawned");

    Ok(SpawnedShell {
        process: Arc::new(PipedShellProcess {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
        }),
        output: rx,
    })
}

fn spawn_output_pump<R: Read + Send + 'static>(
    mut reader: R,
    tx: Sender<String>,
    trace_id: String,
    stream: &'static str,
) {
    std::thread::spawn(move || {
        let mut temp = [0u8; 4096];
        let mut assembler = LineAssembler::new();
        loop {
            let read_count = match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => count,
                Err(err) => {
                    warn!(trace_id = %trace_id, stream, error = %err, "failed to read shell output");
                    break;
                }
            };
            for line in assembler.push(&temp[..read_count]) {
                if tx.send(line).is_err() {
                    return;
                }
            }
        }
        if let Some(rest) = assembler.finish() {
            let _ = tx.send(rest);
        }
    });
}

impl ShellProcess for PipedShellProcess {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut guard = self
            .stdin
            .lock()
            .map_err(|_| io::Error::other("stdin lock poisoned"))?;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "shell stdin is closed"))?;
        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()?;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        let mut guard = match self.child.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        matches!(guard.try_wait(), Ok(None))
    }

    fn close_streams(&self) {
        if let Ok(mut guard) = self.stdin.lock() {
            guard.take();
        }
    }

    fn kill(&self) {
        if let Ok(mut guard) = self.child.lock() {
            let _ = guard.kill();
            // wait() reaps the child so we do not leak a zombie process on Unix.
            let _ = guard.wait();
        }
    }
}

impl Drop for PipedShellProcess {
    fn drop(&mut self) {
        if let Ok(child) = self.child.get_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

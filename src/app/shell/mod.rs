//! Persistent interactive shell bound to whichever device the poller
//! currently considers selected.
//!
//! All subprocess handles live in a single `Mutex<ShellState>`. Rebinding,
//! teardown and command execution only touch them while holding it, so a
//! command never observes a half-replaced shell. A read-only status mirror
//! backs [`KeepShell::is_connected`] and friends; it is only written while
//! the state lock is held.

pub mod framing;
pub mod process;

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::adb::poller::{DevicePoller, TickSubscription};
use crate::app::error::AppError;
use crate::app::shell::framing::is_command_prompt;
use crate::app::shell::process::{ShellProcess, ShellSpawner};

pub const DEFAULT_EXECUTE_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const STARTUP_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellPhase {
    Idle,
    Connecting,
    Ready,
    Disposed,
}

#[derive(Debug, Clone)]
pub struct ShellOptions {
    /// How long to let the shell print its banner before discarding it.
    pub startup_grace: Duration,
    pub default_timeout: Duration,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            startup_grace: STARTUP_GRACE,
            default_timeout: DEFAULT_EXECUTE_TIMEOUT,
        }
    }
}

struct ShellState {
    phase: ShellPhase,
    serial: String,
    process: Option<Arc<dyn ShellProcess>>,
    output: Option<Receiver<String>>,
}

#[derive(Clone)]
struct ShellStatus {
    phase: ShellPhase,
    serial: String,
    process: Option<Arc<dyn ShellProcess>>,
}

struct ShellCore {
    spawner: Arc<dyn ShellSpawner>,
    options: ShellOptions,
    state: Mutex<ShellState>,
    status: RwLock<ShellStatus>,
}

impl ShellCore {
    fn lock_state(&self) -> MutexGuard<'_, ShellState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish_status(&self, state: &ShellState) {
        let status = ShellStatus {
            phase: state.phase,
            serial: state.serial.clone(),
            process: state.process.clone(),
        };
        match self.status.write() {
            Ok(mut guard) => *guard = status,
            Err(poisoned) => *poisoned.into_inner() = status,
        }
    }

    fn status(&self) -> ShellStatus {
        match self.status.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn run_rebind_worker(&self, rx: Receiver<String>) {
        while let Ok(mut target) = rx.recv() {
            // Only the newest observation matters when ticks pile up behind a long command.
            if let Some(newest) = rx.try_iter().last() {
                target = newest;
            }
            if !self.sync_binding(&target) {
                break;
            }
        }
    }

    /// Brings the binding in line with `target` (empty = no device).
    /// Returns false once the session is disposed.
    fn sync_binding(&self, target: &str) -> bool {
        let mut state = self.lock_state();
        if state.phase == ShellPhase::Disposed {
            return false;
        }
        let trace_id = Uuid::new_v4().to_string();

        if target == state.serial {
            let process_died = state
                .process
                .as_ref()
                .is_some_and(|process| !process.is_alive());
            if !process_died {
                return true;
            }
            warn!(trace_id = %trace_id, serial = %target, "persistent shell exited; restarting");
        }

        let previous = state.serial.clone();
        self.teardown(&mut state);
        if target.is_empty() {
            info!(trace_id = %trace_id, serial = %previous, "device gone, persistent shell closed");
            return true;
        }

        state.serial = target.to_string();
        state.phase = ShellPhase::Connecting;
        self.publish_status(&state);
        self.start_shell(&mut state, &trace_id);
        true
    }

    fn start_shell(&self, state: &mut ShellState, trace_id: &str) {
        match self.spawner.spawn(&state.serial, trace_id) {
            Ok(shell) => {
                if !self.options.startup_grace.is_zero() {
                    thread::sleep(self.options.startup_grace);
                }
                let discarded = shell.output.try_iter().count();
                debug!(trace_id = %trace_id, discarded, "discarded shell banner");
                state.process = Some(shell.process);
                state.output = Some(shell.output);
                state.phase = ShellPhase::Ready;
                info!(trace_id = %trace_id, serial = %state.serial, "persistent shell ready");
                self.publish_status(state);
            }
            Err(err) => {
                error!(
                    trace_id = %trace_id,
                    serial = %state.serial,
                    error = %err,
                    "failed to start persistent shell"
                );
                // Clearing the binding lets the next poll tick retry.
                self.teardown(state);
            }
        }
    }

    fn teardown(&self, state: &mut ShellState) {
        if let Some(process) = state.process.take() {
            process.close_streams();
            process.kill();
        }
        state.output = None;
        state.serial.clear();
        if state.phase != ShellPhase::Disposed {
            state.phase = ShellPhase::Idle;
        }
        self.publish_status(state);
    }

    fn execute(&self, command: &str, timeout: Duration) -> Result<Vec<String>, AppError> {
        let trace_id = Uuid::new_v4().to_string();
        let state = self.lock_state();
        if state.phase == ShellPhase::Disposed {
            return Err(AppError::disposed(trace_id));
        }
        if state.serial.is_empty() {
            return Ok(Vec::new());
        }
        let (Some(process), Some(output)) = (state.process.as_ref(), state.output.as_ref()) else {
            return Ok(Vec::new());
        };

        let stale = output.try_iter().count();
        if stale > 0 {
            debug!(trace_id = %trace_id, stale, "dropped unread shell output");
        }

        if let Err(err) = process.write_line(command) {
            warn!(
                trace_id = %trace_id,
                serial = %state.serial,
                error = %err,
                "failed to write to persistent shell"
            );
            return Ok(Vec::new());
        }

        let deadline = Instant::now() + timeout;
        let mut lines = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AppError::timeout(trace_id));
            }
            match output.recv_timeout(remaining) {
                Ok(line) => {
                    if is_command_prompt(&line) {
                        break;
                    }
                    lines.push(line);
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        trace_id = %trace_id,
                        serial = %state.serial,
                        timeout_ms = timeout.as_millis() as u64,
                        "persistent shell command timed out"
                    );
                    return Err(AppError::timeout(trace_id));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    debug!(trace_id = %trace_id, "persistent shell output closed mid-command");
                    break;
                }
            }
        }
        Ok(lines)
    }
}

/// Keeps one interactive `adb shell` alive for the current device and
/// rebinds it when the poller's selection changes.
pub struct KeepShell {
    core: Arc<ShellCore>,
    subscription: Mutex<Option<TickSubscription>>,
}

impl KeepShell {
    /// Subscribes to `poller`'s tick stream. Rebinding happens on a worker
    /// thread owned by the session, never on the poll thread.
    pub fn new(poller: &DevicePoller, spawner: Arc<dyn ShellSpawner>, options: ShellOptions) -> Self {
        let initial = ShellState {
            phase: ShellPhase::Idle,
            serial: String::new(),
            process: None,
            output: None,
        };
        let core = Arc::new(ShellCore {
            spawner,
            options,
            status: RwLock::new(ShellStatus {
                phase: ShellPhase::Idle,
                serial: String::new(),
                process: None,
            }),
            state: Mutex::new(initial),
        });

        let (tx, rx) = mpsc::channel::<String>();
        let worker_core = Arc::clone(&core);
        thread::spawn(move || worker_core.run_rebind_worker(rx));

        let watch = poller.current_device();
        let subscription = poller.subscribe(move |_devices| {
            let _ = tx.send(watch.serial());
        });

        Self {
            core,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    /// Runs `command` with the configured default timeout.
    pub fn execute(&self, command: &str) -> Result<Vec<String>, AppError> {
        self.core.execute(command, self.core.options.default_timeout)
    }

    /// Writes `command` to the live shell and collects output lines up to the
    /// next prompt. With no device bound the result is empty. A shell that
    /// closes mid-command yields whatever was read so far.
    pub fn execute_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<Vec<String>, AppError> {
        self.core.execute(command, timeout)
    }

    pub fn dispose(&self) {
        {
            let mut state = self.core.lock_state();
            if state.phase == ShellPhase::Disposed {
                return;
            }
            self.core.teardown(&mut state);
            state.phase = ShellPhase::Disposed;
            self.core.publish_status(&state);
        }
        // Dropping the subscription also drops the worker's sender, which ends the worker.
        if let Ok(mut guard) = self.subscription.lock() {
            guard.take();
        }
        info!("persistent shell disposed");
    }

    pub fn is_connected(&self) -> bool {
        let status = self.core.status();
        !status.serial.is_empty()
            && status
                .process
                .as_ref()
                .is_some_and(|process| process.is_alive())
    }

    pub fn bound_serial(&self) -> String {
        self.core.status().serial
    }

    pub fn phase(&self) -> ShellPhase {
        self.core.status().phase
    }
}

impl Drop for KeepShell {
    fn drop(&mut self) {
        self.dispose();
    }
}

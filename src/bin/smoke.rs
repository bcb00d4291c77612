use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use adb_keepshell_lib::app::adb::locator::{
    resolve_adb_program, resolve_emulator_program, validate_adb_program,
};
use adb_keepshell_lib::app::adb::poller::{DevicePoller, NO_DEVICE_CONNECTED};
use adb_keepshell_lib::app::adb::runner::{AdbRunner, CommandRunner};
use adb_keepshell_lib::app::config::{load_config, AppConfig};
use adb_keepshell_lib::app::logging::init_logging;
use adb_keepshell_lib::app::models::AdbDevice;
use adb_keepshell_lib::app::shell::process::AdbShellSpawner;
use adb_keepshell_lib::app::shell::KeepShell;
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use uuid::Uuid;

/// Trailing echo that gives the prompt heuristic a terminator line, since a
/// non-tty `adb shell` prints no prompt of its own.
const SMOKE_MARKER: &str = "keepshell-smoke";
const TERMINATOR: &str = "echo 'keepshell$'";

#[derive(Debug, Parser)]
#[command(name = "smoke", about = "End-to-end check of device polling and the persistent shell")]
struct Args {
    /// Device to bind; defaults to the first attached device.
    #[arg(long, env = "ANDROID_SERIAL")]
    serial: Option<String>,
    /// Print the summary as JSON.
    #[arg(long)]
    json: bool,
    /// Seconds to wait for a device and a ready shell.
    #[arg(long, default_value_t = 20)]
    wait_secs: u64,
}

#[derive(Serialize)]
struct SmokeSummary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    started_at: String,
    serial: Option<String>,
    adb_program: Option<String>,
    checks: Vec<SmokeCheck>,
}

#[derive(Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: &'static str, // pass|fail|warn
    duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

fn run_check<F>(checks: &mut Vec<SmokeCheck>, name: &'static str, f: F) -> bool
where
    F: FnOnce() -> Result<Option<String>, String>,
{
    let start = Instant::now();
    let (status, detail, passed) = match f() {
        Ok(detail) => ("pass", detail, true),
        Err(err) => ("fail", Some(err), false),
    };
    checks.push(SmokeCheck {
        name,
        status,
        duration_ms: start.elapsed().as_millis(),
        detail,
    });
    passed
}

fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(100));
    }
    condition()
}

fn finish(summary: SmokeSummary, json: bool) -> ! {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        for check in &summary.checks {
            println!(
                "{:<20} {:<5} {:>6}ms {}",
                check.name,
                check.status,
                check.duration_ms,
                check.detail.as_deref().unwrap_or("")
            );
        }
        println!("status: {}\ntrace_id: {}", summary.status, summary.trace_id);
    }
    std::process::exit(if summary.status == "pass" { 0 } else { 1 });
}

fn main() {
    let args = Args::parse();
    let trace_id = Uuid::new_v4().to_string();
    let started_at = Utc::now().to_rfc3339();
    let mut checks = Vec::new();

    let mut config = AppConfig::default();
    let loaded = run_check(&mut checks, "load_config", || {
        config = load_config(&trace_id).map_err(|err| err.to_string())?;
        Ok(None)
    });
    init_logging(&config.logging.log_level);

    let adb_program = resolve_adb_program(&config.adb.command_path);
    let mut summary = SmokeSummary {
        tool: "adb_keepshell_smoke",
        status: "fail",
        trace_id: trace_id.clone(),
        started_at,
        serial: args.serial.clone(),
        adb_program: Some(adb_program.clone()),
        checks: Vec::new(),
    };
    if !loaded {
        summary.checks = checks;
        finish(summary, args.json);
    }

    let runner = Arc::new(AdbRunner::with_timeout(
        adb_program.clone(),
        Duration::from_millis(config.adb.command_timeout_ms),
    ));
    let adb_ok = run_check(&mut checks, "check_adb", || {
        validate_adb_program(&adb_program, &trace_id).map_err(|err| err.to_string())?;
        let lines = runner
            .run(None, &["version".to_string()], &trace_id)
            .map_err(|err| err.to_string())?;
        Ok(lines.first().cloned())
    });
    if !adb_ok {
        summary.checks = checks;
        finish(summary, args.json);
    }

    let emulator_program = resolve_emulator_program(&config.adb.emulator_path, &adb_program);
    let poller = Arc::new(DevicePoller::with_interval(
        runner.clone(),
        emulator_program,
        Duration::from_millis(config.device.poll_interval_ms),
    ));
    let shell = KeepShell::new(
        &poller,
        Arc::new(AdbShellSpawner::new(adb_program.clone())),
        config.shell.to_options(),
    );

    let wanted = args.serial.clone();
    let selector = Arc::downgrade(&poller);
    let poll_handle = poller.poll(move |devices: &[AdbDevice]| {
        let Some(poller) = selector.upgrade() else {
            return;
        };
        match wanted.as_deref() {
            Some(serial) => match devices.iter().find(|device| device.serial == serial) {
                Some(device) if poller.current().as_ref() != Some(device) => {
                    poller.connect(device.clone())
                }
                Some(_) => {}
                None => {
                    if poller.current().is_some() {
                        poller.disconnect();
                    }
                }
            },
            None => {
                poller.auto_select(devices);
            }
        }
    });

    let wait = Duration::from_secs(args.wait_secs.max(1));
    run_check(&mut checks, "select_device", || {
        if wait_for(wait, || poller.current().is_some()) {
            let serial = poller.current().map(|device| device.serial);
            summary.serial = serial.clone();
            Ok(serial)
        } else {
            Err("No online adb devices found.".to_string())
        }
    });

    run_check(&mut checks, "shell_bind", || {
        if wait_for(wait, || shell.is_connected()) {
            Ok(Some(shell.bound_serial()))
        } else {
            Err(format!("persistent shell not ready (phase {:?})", shell.phase()))
        }
    });

    run_check(&mut checks, "exec_oneshot", || {
        let lines = poller.exec("shell getprop ro.product.model");
        match lines.first().map(String::as_str) {
            Some(line) if line == NO_DEVICE_CONNECTED || line.starts_with("Error:") => {
                Err(line.to_string())
            }
            first => Ok(first.map(str::to_string)),
        }
    });

    run_check(&mut checks, "shell_execute", || {
        let lines = shell
            .execute(&format!("echo {SMOKE_MARKER}; {TERMINATOR}"))
            .map_err(|err| err.to_string())?;
        if lines.iter().any(|line| line.trim() == SMOKE_MARKER) {
            Ok(Some(format!("{} line(s)", lines.len())))
        } else {
            Err(format!("unexpected output: {lines:?}"))
        }
    });

    let avds = poller.request();
    checks.push(SmokeCheck {
        name: "list_avds",
        status: if avds.is_empty() { "warn" } else { "pass" },
        duration_ms: 0,
        detail: Some(format!("{} image(s)", avds.len())),
    });

    drop(poll_handle);
    shell.dispose();

    summary.status = if checks.iter().any(|check| check.status == "fail") {
        "fail"
    } else {
        "pass"
    };
    summary.checks = checks;
    finish(summary, args.json);
}

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use adb_keepshell_lib::app::adb::locator::{
    resolve_adb_program, resolve_emulator_program, validate_adb_program,
};
use adb_keepshell_lib::app::adb::poller::DevicePoller;
use adb_keepshell_lib::app::adb::runner::AdbRunner;
use adb_keepshell_lib::app::config::{load_config, save_config};
use adb_keepshell_lib::app::logging::init_logging;
use adb_keepshell_lib::app::models::{AdbDevice, WirelessDebugState};
use adb_keepshell_lib::app::shell::process::AdbShellSpawner;
use adb_keepshell_lib::app::shell::KeepShell;
use clap::Parser;
use tracing::{error, info};
use uuid::Uuid;

/// Appended to every console command: a non-tty `adb shell` prints no prompt,
/// so the console supplies the terminator line itself.
const PROMPT_TERMINATOR: &str = "echo 'keepshell$'";

#[derive(Debug, Parser)]
#[command(
    name = "adb_keepshell",
    version,
    about = "Interactive console over a persistent adb shell that follows the selected device"
)]
struct Args {
    /// Overrides `adb.command_path` from the config file.
    #[arg(long)]
    adb: Option<String>,
    /// Overrides `logging.log_level` from the config file.
    #[arg(long)]
    log_level: Option<String>,
    /// Per-command timeout in milliseconds for the persistent shell.
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Write the effective configuration back to the config file and exit.
    #[arg(long)]
    write_config: bool,
}

fn print_help() {
    println!(
        ":devices            list attached devices\n\
         :connect <serial>   make <serial> the current device\n\
         :disconnect         clear the current device and pause auto-selection\n\
         :exec <args...>     one-shot adb command against the current device\n\
         :avds               list emulator images\n\
         :status             show the persistent shell binding\n\
         :quit               exit\n\
         anything else runs in the persistent shell"
    );
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

fn main() {
    let args = Args::parse();
    let trace_id = Uuid::new_v4().to_string();

    let mut config = match load_config(&trace_id) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };
    if let Some(adb) = args.adb {
        config.adb.command_path = adb;
    }
    if let Some(level) = args.log_level {
        config.logging.log_level = level;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.shell.command_timeout_ms = timeout_ms.max(100);
    }
    init_logging(&config.logging.log_level);

    if args.write_config {
        if let Err(err) = save_config(&config, &trace_id) {
            eprintln!("{err}");
            std::process::exit(1);
        }
        return;
    }

    let adb_program = resolve_adb_program(&config.adb.command_path);
    if let Err(err) = validate_adb_program(&adb_program, &trace_id) {
        error!(trace_id = %trace_id, error = %err, "adb is not usable");
        eprintln!("{err}");
        std::process::exit(2);
    }
    let emulator_program = resolve_emulator_program(&config.adb.emulator_path, &adb_program);
    info!(trace_id = %trace_id, adb = %adb_program, emulator = %emulator_program, "starting");

    let runner = Arc::new(AdbRunner::with_timeout(
        adb_program.clone(),
        Duration::from_millis(config.adb.command_timeout_ms),
    ));
    let poller = Arc::new(DevicePoller::with_interval(
        runner,
        emulator_program,
        Duration::from_millis(config.device.poll_interval_ms),
    ));
    let shell = KeepShell::new(
        &poller,
        Arc::new(AdbShellSpawner::new(adb_program)),
        config.shell.to_options(),
    );

    let auto_select = config.device.auto_select;
    let selector = Arc::downgrade(&poller);
    let poll_handle = poller.poll(move |devices: &[AdbDevice]| {
        if !auto_select {
            return;
        }
        if let Some(poller) = selector.upgrade() {
            poller.auto_select(devices);
        }
    });

    let watch = poller.current_device();
    thread::spawn(move || {
        let mut seen = watch.version();
        loop {
            let Some((version, device)) = watch.wait_for_change(seen, Duration::from_secs(60))
            else {
                continue;
            };
            seen = version;
            match device {
                Some(device) => println!("\n[current device: {}]", device.serial),
                None => println!("\n[no device]"),
            }
        }
    });

    print_help();
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        let _ = write!(stdout, "{}> ", shell.bound_serial());
        let _ = stdout.flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                error!(error = %err, "failed to read console input");
                break;
            }
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let (command, rest) = input
            .split_once(char::is_whitespace)
            .map(|(command, rest)| (command, rest.trim()))
            .unwrap_or((input, ""));
        match command {
            ":quit" | ":q" => break,
            ":help" => print_help(),
            ":devices" => {
                let current = poller.current();
                for device in poller.devices() {
                    let marker = if current.as_ref() == Some(&device) { "*" } else { " " };
                    let wireless = match device.wireless {
                        WirelessDebugState::Enabled => "wireless on",
                        WirelessDebugState::Disabled => "wireless off",
                        WirelessDebugState::Unknown => "wireless ?",
                    };
                    println!("{marker} {} ({wireless})", device.serial);
                }
            }
            ":connect" => match poller.devices().into_iter().find(|d| d.serial == rest) {
                Some(device) => poller.connect(device),
                None => println!("{rest} is not attached"),
            },
            ":disconnect" => {
                poller.detach();
                if auto_select {
                    println!("auto-selection paused until :connect");
                }
            }
            ":exec" => print_lines(&poller.exec(rest)),
            ":avds" => {
                for avd in poller.request() {
                    println!("{}", avd.name);
                }
            }
            ":status" => println!(
                "bound={} phase={:?} connected={}",
                shell.bound_serial(),
                shell.phase(),
                shell.is_connected()
            ),
            _ => match shell.execute(&format!("{input}; {PROMPT_TERMINATOR}")) {
                Ok(lines) => print_lines(&lines),
                Err(err) => eprintln!("{err}"),
            },
        }
    }

    drop(poll_handle);
    shell.dispose();
}

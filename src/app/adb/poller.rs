use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::adb::current::{current_device_channel, CurrentDevicePublisher, CurrentDeviceWatch};
use crate::app::adb::parse::{parse_adb_devices, parse_avd_list, parse_settings_bool};
use crate::app::adb::runner::CommandRunner;
use crate::app::error::AppError;
use crate::app::models::{AdbDevice, AndroidVirtualDevice, WirelessDebugState};

pub const POLLING_INTERVAL: Duration = Duration::from_millis(3000);
pub const NO_DEVICE_CONNECTED: &str = "No device connected";

type TickCallback = Arc<dyn Fn(&[AdbDevice]) + Send + Sync>;

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    fn stop(&self) {
        if let Ok(mut stopped) = self.stopped.lock() {
            *stopped = true;
        }
        self.cv.notify_all();
    }

    fn is_stopped(&self) -> bool {
        self.stopped.lock().map(|stopped| *stopped).unwrap_or(true)
    }

    /// Sleeps for `timeout` unless stopped first. Returns true when stopped.
    fn wait(&self, timeout: Duration) -> bool {
        let Ok(guard) = self.stopped.lock() else {
            return true;
        };
        match self.cv.wait_timeout_while(guard, timeout, |stopped| !*stopped) {
            Ok((stopped, _)) => *stopped,
            Err(_) => true,
        }
    }
}

/// Keeps a poll loop alive. Dropping or cancelling it stops further cycles.
#[must_use = "dropping the handle stops polling"]
pub struct PollHandle {
    signal: Arc<StopSignal>,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.signal.stop();
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_stopped()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.signal.stop();
    }
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(u64, TickCallback)>,
}

/// Registration on the per-cycle notification stream. Dropping it unsubscribes.
#[must_use = "dropping the subscription stops delivery"]
pub struct TickSubscription {
    id: u64,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl TickSubscription {
    pub fn cancel(self) {}
}

impl Drop for TickSubscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            if let Ok(mut guard) = subscribers.lock() {
                guard.entries.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

struct PollerCore {
    runner: Arc<dyn CommandRunner>,
    emulator_program: String,
    interval: Duration,
    devices: Mutex<Vec<AdbDevice>>,
    subscribers: Arc<Mutex<Subscribers>>,
}

impl PollerCore {
    fn run_loop<F>(&self, signal: &StopSignal, mut on_change: F)
    where
        F: FnMut(&[AdbDevice]),
    {
        loop {
            if signal.is_stopped() {
                return;
            }
            let trace_id = Uuid::new_v4().to_string();
            match self.collect_devices(&trace_id) {
                Ok(devices) => {
                    if signal.is_stopped() {
                        return;
                    }
                    if let Ok(mut guard) = self.devices.lock() {
                        *guard = devices.clone();
                    }
                    on_change(&devices);
                    // on_change may have restarted or stopped polling.
                    if signal.is_stopped() {
                        return;
                    }
                    self.notify_subscribers(&devices);
                }
                Err(err) => {
                    debug!(trace_id = %trace_id, error = %err, "device poll cycle failed");
                }
            }
            if signal.wait(self.interval) {
                return;
            }
        }
    }

    fn collect_devices(&self, trace_id: &str) -> Result<Vec<AdbDevice>, AppError> {
        let lines = self.runner.run(None, &["devices".to_string()], trace_id)?;
        let devices = parse_adb_devices(&lines.join("\n"))
            .into_iter()
            .filter(|summary| summary.is_online())
            .map(|summary| {
                let wireless = self.query_wireless(&summary.serial, trace_id);
                AdbDevice::new(summary.serial, wireless)
            })
            .collect();
        Ok(devices)
    }

    fn query_wireless(&self, serial: &str, trace_id: &str) -> WirelessDebugState {
        let args = ["shell", "settings", "get", "global", "adb_wifi_enabled"]
            .iter()
            .map(|arg| arg.to_string())
            .collect::<Vec<_>>();
        match self.runner.run(Some(serial), &args, trace_id) {
            Ok(lines) => WirelessDebugState::from_flag(parse_settings_bool(&lines.join("\n"))),
            Err(err) => {
                debug!(
                    trace_id = %trace_id,
                    serial = %serial,
                    error = %err,
                    "wireless debug state query failed"
                );
                WirelessDebugState::Unknown
            }
        }
    }

    fn notify_subscribers(&self, devices: &[AdbDevice]) {
        let callbacks = match self.subscribers.lock() {
            Ok(guard) => guard
                .entries
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect::<Vec<_>>(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback(devices);
        }
    }
}

/// Periodically enumerates attached devices and owns the current-device selection.
pub struct DevicePoller {
    core: Arc<PollerCore>,
    current: CurrentDevicePublisher,
    active: Mutex<Option<Arc<StopSignal>>>,
    auto_select_held: AtomicBool,
}

impl DevicePoller {
    pub fn new(runner: Arc<dyn CommandRunner>, emulator_program: impl Into<String>) -> Self {
        Self::with_interval(runner, emulator_program, POLLING_INTERVAL)
    }

    pub fn with_interval(
        runner: Arc<dyn CommandRunner>,
        emulator_program: impl Into<String>,
        interval: Duration,
    ) -> Self {
        let (current, _) = current_device_channel();
        Self {
            core: Arc::new(PollerCore {
                runner,
                emulator_program: emulator_program.into(),
                interval,
                devices: Mutex::new(Vec::new()),
                subscribers: Arc::new(Mutex::new(Subscribers::default())),
            }),
            current,
            active: Mutex::new(None),
            auto_select_held: AtomicBool::new(false),
        }
    }

    pub fn interval(&self) -> Duration {
        self.core.interval
    }

    /// (Re)starts the poll loop. Any previous loop is signalled to stop
    /// first, so at most one loop delivers callbacks per poller. Neither this
    /// nor `stop` waits for an in-flight cycle to finish; a cancelled loop
    /// drops its result. `on_change` runs on the poll thread before the tick
    /// subscribers, with the full device set of that cycle, and may itself
    /// call `poll` or `stop`.
    pub fn poll<F>(&self, on_change: F) -> PollHandle
    where
        F: FnMut(&[AdbDevice]) + Send + 'static,
    {
        let signal = Arc::new(StopSignal::default());
        let previous = {
            let mut active = match self.active.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            active.replace(Arc::clone(&signal))
        };
        if let Some(previous) = previous {
            previous.stop();
        }

        let loop_signal = Arc::clone(&signal);
        let core = Arc::clone(&self.core);
        thread::spawn(move || core.run_loop(&loop_signal, on_change));
        info!(interval_ms = self.core.interval.as_millis() as u64, "device polling started");
        PollHandle { signal }
    }

    pub fn stop(&self) {
        let previous = match self.active.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(previous) = previous {
            previous.stop();
        }
    }

    /// Adds a listener that receives every cycle's device set without
    /// replacing the `poll` callback.
    pub fn subscribe<F>(&self, on_tick: F) -> TickSubscription
    where
        F: Fn(&[AdbDevice]) + Send + Sync + 'static,
    {
        let mut guard = match self.core.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let id = guard.next_id;
        guard.next_id += 1;
        guard.entries.push((id, Arc::new(on_tick)));
        TickSubscription {
            id,
            subscribers: Arc::downgrade(&self.core.subscribers),
        }
    }

    pub fn connect(&self, device: AdbDevice) {
        self.auto_select_held.store(false, Ordering::SeqCst);
        info!(serial = %device.serial, "current device selected");
        self.current.publish(Some(device));
    }

    pub fn disconnect(&self) {
        info!("current device cleared");
        self.current.publish(None);
    }

    /// Clears the selection and keeps it clear: `auto_select` leaves it
    /// alone until the next `connect`.
    pub fn detach(&self) {
        self.auto_select_held.store(true, Ordering::SeqCst);
        self.disconnect();
    }

    pub fn is_detached(&self) -> bool {
        self.auto_select_held.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<AdbDevice> {
        self.current.watch().get()
    }

    pub fn current_device(&self) -> CurrentDeviceWatch {
        self.current.watch()
    }

    /// Device set from the most recent successful cycle.
    pub fn devices(&self) -> Vec<AdbDevice> {
        self.core
            .devices
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Keeps the current device while it is still attached, otherwise
    /// selects the first attached one, or clears the selection when none is.
    pub fn auto_select(&self, devices: &[AdbDevice]) -> Option<AdbDevice> {
        let current = self.current();
        if self.is_detached() {
            return current;
        }
        let Some(first) = devices.first() else {
            if current.is_some() {
                self.disconnect();
            }
            return None;
        };
        match current {
            Some(current) if devices.contains(&current) => Some(current),
            _ => {
                self.connect(first.clone());
                Some(first.clone())
            }
        }
    }

    /// Lists emulator images. Failures are reported as an empty list.
    pub fn request(&self) -> Vec<AndroidVirtualDevice> {
        let trace_id = Uuid::new_v4().to_string();
        match self.core.runner.run_program(
            &self.core.emulator_program,
            &["-list-avds".to_string()],
            &trace_id,
        ) {
            Ok(lines) => parse_avd_list(&lines.join("\n")),
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "failed to list emulator images");
                Vec::new()
            }
        }
    }

    /// Runs a one-shot adb command against the current device. Never fails:
    /// problems come back as a single descriptive line.
    ///
    /// Everything after a leading `shell` is handed to adb as one argument,
    /// so quoting reaches the device shell intact.
    pub fn exec(&self, cmd: &str) -> Vec<String> {
        let Some(device) = self.current() else {
            return vec![NO_DEVICE_CONNECTED.to_string()];
        };
        let trace_id = Uuid::new_v4().to_string();
        let args = match exec_args(cmd) {
            Ok(args) => args,
            Err(message) => return vec![format!("Error: {message}")],
        };
        match self.core.runner.run(Some(&device.serial), &args, &trace_id) {
            Ok(lines) => lines,
            Err(err) => {
                debug!(trace_id = %trace_id, serial = %device.serial, error = %err, "exec failed");
                vec![format!("Error: {}", err.error)]
            }
        }
    }
}

fn exec_args(cmd: &str) -> Result<Vec<String>, String> {
    let args = shell_words::split(cmd).map_err(|err| err.to_string())?;
    if args.is_empty() {
        return Err("command is empty".to_string());
    }
    let remote = cmd
        .trim_start()
        .strip_prefix("shell")
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(str::trim);
    match remote {
        Some(remote) if args[0] == "shell" && !remote.is_empty() => {
            Ok(vec!["shell".to_string(), remote.to_string()])
        }
        _ => Ok(args),
    }
}

impl Drop for DevicePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Instant;

    /// Scripted runner keyed by the space-joined argument list.
    #[derive(Default)]
    pub(crate) struct FakeRunner {
        pub responses: Mutex<HashMap<String, Result<Vec<String>, AppError>>>,
        pub calls: Mutex<Vec<(Option<String>, Vec<String>)>>,
        pub devices_calls: AtomicUsize,
        /// Added to every `run` call.
        pub latency: Mutex<Duration>,
    }

    impl FakeRunner {
        pub fn with_devices(serials: &[&str]) -> Self {
            let runner = Self::default();
            runner.set_devices(serials);
            runner
        }

        pub fn set_devices(&self, serials: &[&str]) {
            let mut lines = vec!["List of devices attached".to_string()];
            lines.extend(serials.iter().map(|serial| format!("{serial}\tdevice")));
            self.respond("devices", Ok(lines));
        }

        pub fn respond(&self, key: &str, response: Result<Vec<String>, AppError>) {
            self.responses
                .lock()
                .expect("responses")
                .insert(key.to_string(), response);
        }

        fn lookup(&self, key: &str) -> Result<Vec<String>, AppError> {
            self.responses
                .lock()
                .expect("responses")
                .get(key)
                .cloned()
                .unwrap_or_else(|| Err(AppError::system(format!("unscripted: {key}"), "")))
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(
            &self,
            serial: Option<&str>,
            args: &[String],
            _trace_id: &str,
        ) -> Result<Vec<String>, AppError> {
            let latency = *self.latency.lock().expect("latency");
            if !latency.is_zero() {
                thread::sleep(latency);
            }
            self.calls
                .lock()
                .expect("calls")
                .push((serial.map(str::to_string), args.to_vec()));
            let key = args.join(" ");
            if key == "devices" {
                self.devices_calls.fetch_add(1, Ordering::SeqCst);
            }
            match serial {
                Some(serial) => self
                    .lookup(&format!("{serial}: {key}"))
                    .or_else(|_| self.lookup(&key)),
                None => self.lookup(&key),
            }
        }

        fn run_program(
            &self,
            program: &str,
            args: &[String],
            _trace_id: &str,
        ) -> Result<Vec<String>, AppError> {
            self.lookup(&format!("{program} {}", args.join(" ")))
        }
    }

    fn poller(runner: Arc<FakeRunner>) -> DevicePoller {
        DevicePoller::with_interval(runner, "emulator", Duration::from_millis(20))
    }

    #[test]
    fn poll_publishes_device_set_with_wireless_state() {
        let runner = Arc::new(FakeRunner::with_devices(&["A1", "B2"]));
        runner.respond(
            "A1: shell settings get global adb_wifi_enabled",
            Ok(vec!["1".to_string()]),
        );
        runner.respond(
            "B2: shell settings get global adb_wifi_enabled",
            Ok(vec!["0".to_string()]),
        );
        let poller = poller(Arc::clone(&runner));

        let (tx, rx) = mpsc::channel();
        let _handle = poller.poll(move |devices| {
            let _ = tx.send(devices.to_vec());
        });

        let devices = rx.recv_timeout(Duration::from_secs(2)).expect("snapshot");
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].serial, "A1");
        assert_eq!(devices[0].wireless, WirelessDebugState::Enabled);
        assert_eq!(devices[1].wireless, WirelessDebugState::Disabled);
        assert_eq!(poller.devices().len(), 2);
    }

    #[test]
    fn offline_devices_are_skipped_and_wireless_failure_is_unknown() {
        let runner = Arc::new(FakeRunner::default());
        runner.respond(
            "devices",
            Ok(vec![
                "List of devices attached".to_string(),
                "A1\tdevice".to_string(),
                "C3\tunauthorized".to_string(),
            ]),
        );
        let poller = poller(Arc::clone(&runner));

        let (tx, rx) = mpsc::channel();
        let _handle = poller.poll(move |devices| {
            let _ = tx.send(devices.to_vec());
        });

        let devices = rx.recv_timeout(Duration::from_secs(2)).expect("snapshot");
        assert_eq!(devices, vec![AdbDevice::new("A1", WirelessDebugState::Unknown)]);
        assert_eq!(devices[0].wireless, WirelessDebugState::Unknown);
    }

    #[test]
    fn poll_survives_failing_cycles() {
        let runner = Arc::new(FakeRunner::default());
        runner.respond("devices", Err(AppError::system("adb server not running", "")));
        let poller = poller(Arc::clone(&runner));

        let (tx, rx) = mpsc::channel();
        let _handle = poller.poll(move |devices| {
            let _ = tx.send(devices.len());
        });

        thread::sleep(Duration::from_millis(100));
        assert!(rx.try_recv().is_err());
        assert!(runner.devices_calls.load(Ordering::SeqCst) >= 2);

        runner.set_devices(&["A1"]);
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).expect("recovered"), 1);
    }

    #[test]
    fn repoll_replaces_previous_loop() {
        let runner = Arc::new(FakeRunner::with_devices(&[]));
        let poller = poller(Arc::clone(&runner));

        let first_count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&first_count);
        let first = poller.poll(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (tx, rx) = mpsc::channel();
        let _second = poller.poll(move |_| {
            let _ = tx.send(());
        });
        assert!(first.is_cancelled());

        rx.recv_timeout(Duration::from_secs(2)).expect("second loop runs");
        thread::sleep(Duration::from_millis(30));
        let frozen = first_count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(80));
        assert_eq!(first_count.load(Ordering::SeqCst), frozen);
    }

    #[test]
    fn restart_does_not_wait_for_in_flight_cycle() {
        let runner = Arc::new(FakeRunner::with_devices(&["A1"]));
        *runner.latency.lock().expect("latency") = Duration::from_millis(600);
        let poller = poller(Arc::clone(&runner));

        let first = poller.poll(|_| {});
        let deadline = Instant::now() + Duration::from_secs(2);
        while runner.calls.lock().expect("calls").is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let start = Instant::now();
        let (tx, rx) = mpsc::channel();
        let _second = poller.poll(move |devices| {
            let _ = tx.send(devices.len());
        });
        assert!(start.elapsed() < Duration::from_millis(300));
        assert!(first.is_cancelled());

        let start = Instant::now();
        poller.stop();
        assert!(start.elapsed() < Duration::from_millis(300));
        assert!(rx.recv_timeout(Duration::from_secs(3)).is_err());
    }

    #[test]
    fn restart_from_callback_races_external_restart() {
        let runner = Arc::new(FakeRunner::with_devices(&["A1"]));
        let poller = Arc::new(poller(Arc::clone(&runner)));

        let (entered_tx, entered_rx) = mpsc::channel();
        let (nested_tx, nested_rx) = mpsc::channel();
        let weak = Arc::downgrade(&poller);
        let mut fired = false;
        let _first = poller.poll(move |_| {
            if fired {
                return;
            }
            fired = true;
            let _ = entered_tx.send(());
            thread::sleep(Duration::from_millis(300));
            if let Some(poller) = weak.upgrade() {
                let nested = poller.poll(|_| {});
                let _ = nested_tx.send(nested);
            }
        });
        entered_rx.recv_timeout(Duration::from_secs(2)).expect("callback entered");

        let external = Arc::clone(&poller);
        let (done_tx, done_rx) = mpsc::channel();
        thread::spawn(move || {
            let handle = external.poll(|_| {});
            let _ = done_tx.send(handle);
        });

        let external_handle = done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("external poll returns while callback runs");
        let nested_handle = nested_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("nested poll returns");
        // The callback restarted last, so its loop is the live one.
        assert!(external_handle.is_cancelled());
        assert!(!nested_handle.is_cancelled());
    }

    #[test]
    fn dropping_handle_stops_polling_promptly() {
        let runner = Arc::new(FakeRunner::with_devices(&["A1"]));
        let poller =
            DevicePoller::with_interval(runner.clone(), "emulator", Duration::from_secs(60));
        let (tx, rx) = mpsc::channel();
        let handle = poller.poll(move |_| {
            let _ = tx.send(());
        });
        rx.recv_timeout(Duration::from_secs(2)).expect("first cycle");

        let start = Instant::now();
        drop(handle);
        poller.stop();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(runner.devices_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribers_receive_ticks_until_dropped() {
        let runner = Arc::new(FakeRunner::with_devices(&["A1"]));
        let poller = poller(Arc::clone(&runner));

        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let subscription = poller.subscribe(move |devices| {
            assert_eq!(devices.len(), 1);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let _handle = poller.poll(|_| {});

        let deadline = Instant::now() + Duration::from_secs(2);
        while ticks.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(ticks.load(Ordering::SeqCst) >= 2);

        subscription.cancel();
        thread::sleep(Duration::from_millis(30));
        let frozen = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(80));
        assert_eq!(ticks.load(Ordering::SeqCst), frozen);
    }

    #[test]
    fn exec_without_device_returns_sentinel_and_skips_runner() {
        let runner = Arc::new(FakeRunner::default());
        let poller = poller(Arc::clone(&runner));
        assert_eq!(poller.exec("shell getprop"), vec![NO_DEVICE_CONNECTED.to_string()]);
        assert!(runner.calls.lock().expect("calls").is_empty());
    }

    #[test]
    fn exec_scopes_to_current_device_and_wraps_errors() {
        let runner = Arc::new(FakeRunner::default());
        runner.respond(
            "A1: shell pm path 'com.example.app'",
            Ok(vec!["package:/data/app/base.apk".to_string()]),
        );
        let poller = poller(Arc::clone(&runner));
        poller.connect(AdbDevice::new("A1", WirelessDebugState::Unknown));

        assert_eq!(
            poller.exec("shell pm path 'com.example.app'"),
            vec!["package:/data/app/base.apk".to_string()]
        );
        let calls = runner.calls.lock().expect("calls").clone();
        assert_eq!(calls[0].0.as_deref(), Some("A1"));

        let lines = poller.exec("shell missing");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Error: "));
        assert!(poller.exec("shell 'unterminated")[0].starts_with("Error: "));
        assert_eq!(poller.exec("   "), vec!["Error: command is empty".to_string()]);
    }

    #[test]
    fn exec_keeps_remote_shell_quoting_in_one_argument() {
        let runner = Arc::new(FakeRunner::default());
        runner.respond(
            "A1: shell grep 'cache size' /proc/cpuinfo",
            Ok(vec!["cache size\t: 512 KB".to_string()]),
        );
        runner.respond("A1: get-state", Ok(vec!["device".to_string()]));
        let poller = poller(Arc::clone(&runner));
        poller.connect(AdbDevice::new("A1", WirelessDebugState::Unknown));

        assert_eq!(
            poller.exec("  shell grep 'cache size' /proc/cpuinfo"),
            vec!["cache size\t: 512 KB".to_string()]
        );
        assert_eq!(poller.exec("get-state"), vec!["device".to_string()]);
        let calls = runner.calls.lock().expect("calls").clone();
        assert_eq!(
            calls[0].1,
            vec!["shell".to_string(), "grep 'cache size' /proc/cpuinfo".to_string()]
        );
        assert_eq!(calls[1].1, vec!["get-state".to_string()]);
    }

    #[test]
    fn request_lists_avds_or_returns_empty() {
        let runner = Arc::new(FakeRunner::default());
        let poller = poller(Arc::clone(&runner));
        assert!(poller.request().is_empty());

        runner.respond("emulator -list-avds", Ok(vec!["Pixel_7_API_34".to_string()]));
        let avds = poller.request();
        assert_eq!(avds.len(), 1);
        assert_eq!(avds[0].name, "Pixel_7_API_34");
    }

    #[test]
    fn connect_and_disconnect_update_watch() {
        let poller = poller(Arc::new(FakeRunner::default()));
        let watch = poller.current_device();
        poller.connect(AdbDevice::new("A1", WirelessDebugState::Enabled));
        assert_eq!(watch.serial(), "A1");
        poller.disconnect();
        assert_eq!(watch.serial(), "");
        assert_eq!(watch.version(), 2);
    }

    #[test]
    fn auto_select_keeps_current_or_falls_back_to_first() {
        let poller = poller(Arc::new(FakeRunner::default()));
        let a = AdbDevice::new("A1", WirelessDebugState::Unknown);
        let b = AdbDevice::new("B2", WirelessDebugState::Unknown);

        assert_eq!(poller.auto_select(&[a.clone(), b.clone()]), Some(a.clone()));
        poller.connect(b.clone());
        assert_eq!(poller.auto_select(&[a.clone(), b.clone()]), Some(b.clone()));
        assert_eq!(poller.auto_select(&[a.clone()]), Some(a.clone()));
        assert_eq!(poller.current_device().serial(), "A1");

        assert_eq!(poller.auto_select(&[]), None);
        assert!(poller.current().is_none());
        let version = poller.current_device().version();
        poller.auto_select(&[]);
        assert_eq!(poller.current_device().version(), version);
    }

    #[test]
    fn detach_holds_selection_clear_until_connect() {
        let poller = poller(Arc::new(FakeRunner::default()));
        let a = AdbDevice::new("A1", WirelessDebugState::Unknown);
        let b = AdbDevice::new("B2", WirelessDebugState::Unknown);

        assert_eq!(poller.auto_select(&[a.clone(), b.clone()]), Some(a.clone()));
        poller.detach();
        assert!(poller.is_detached());
        assert_eq!(poller.auto_select(&[a.clone(), b.clone()]), None);
        assert!(poller.current().is_none());

        poller.connect(b.clone());
        assert!(!poller.is_detached());
        assert_eq!(poller.auto_select(&[a.clone()]), Some(a));
    }
}

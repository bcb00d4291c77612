use crate::app::models::{AndroidVirtualDevice, DeviceSummary};

pub fn parse_adb_devices(output: &str) -> Vec<DeviceSummary> {
    output
        .lines()
        .filter(|line| !line.trim_start().starts_with('*'))
        .filter(|line| !line.to_lowercase().contains("list of devices"))
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let serial = tokens.next()?;
            let state = tokens.next()?;
            Some(DeviceSummary {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

pub fn parse_settings_bool(output: &str) -> Option<bool> {
    let value = output
        .lines()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())?;
    if let Ok(num) = value.parse::<i32>() {
        return Some(num != 0);
    }
    match value.to_lowercase().as_str() {
        "true" | "on" | "enabled" => Some(true),
        "false" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// `emulator -list-avds` prints one image name per line, sometimes preceded
/// by `INFO` chatter from the emulator launcher.
pub fn parse_avd_list(output: &str) -> Vec<AndroidVirtualDevice> {
    output
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .filter(|line| !line.contains(' ') && !line.contains('|'))
        .map(|name| AndroidVirtualDevice {
            name: name.to_string(),
        })
        .collect()
}

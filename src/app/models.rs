use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// One row of `adb devices`: serial plus connection state (`device`,
/// `offline`, `unauthorized`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSummary {
    pub serial: String,
    pub state: String,
}

impl DeviceSummary {
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WirelessDebugState {
    Enabled,
    Disabled,
    #[default]
    Unknown,
}

impl WirelessDebugState {
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Self::Enabled,
            Some(false) => Self::Disabled,
            None => Self::Unknown,
        }
    }
}

/// A device as observed by one poll cycle. Two records describe the same
/// device when their serials match, whatever their wireless state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdbDevice {
    pub serial: String,
    pub wireless: WirelessDebugState,
}

impl AdbDevice {
    pub fn new(serial: impl Into<String>, wireless: WirelessDebugState) -> Self {
        Self {
            serial: serial.into(),
            wireless,
        }
    }
}

impl PartialEq for AdbDevice {
    fn eq(&self, other: &Self) -> bool {
        self.serial == other.serial
    }
}

impl Eq for AdbDevice {}

impl Hash for AdbDevice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serial.hash(state);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AndroidVirtualDevice {
    pub name: String,
}

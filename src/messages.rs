use std::fmt;

use mac_address::MacAddress;
use serde_derive::Serialize;

/// Last known power state of a station.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "i8")]
pub enum PowerState {
    #[default]
    Unknown,
    Off,
    On,
}

impl PowerState {
    /// Zero is off; any other byte is treated as on.
    pub fn from_byte(byte: u8) -> Self {
        if byte == 0 {
            PowerState::Off
        } else {
            PowerState::On
        }
    }
}

impl From<PowerState> for i8 {
    fn from(state: PowerState) -> i8 {
        match state {
            PowerState::Unknown => -1,
            PowerState::Off => 0,
            PowerState::On => 1,
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PowerState::Unknown => "unknown",
            PowerState::Off => "off",
            PowerState::On => "on",
        })
    }
}

/// A power state that can be written to a station.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerCommand {
    Off,
    On,
}

impl PowerCommand {
    pub fn byte(self) -> u8 {
        match self {
            PowerCommand::Off => 0x00,
            PowerCommand::On => 0x01,
        }
    }
}

impl From<PowerCommand> for PowerState {
    fn from(command: PowerCommand) -> PowerState {
        match command {
            PowerCommand::Off => PowerState::Off,
            PowerCommand::On => PowerState::On,
        }
    }
}

impl fmt::Display for PowerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        PowerState::from(*self).fmt(f)
    }
}

/// One advertisement seen during a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Advertisement {
    pub address: MacAddress,
    pub name: String,
}

/// Externally visible summary of a station.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationInfo {
    /// Display name, with any rename applied.
    pub name: String,
    pub original_name: String,
    pub address: String,
    pub power_state: PowerState,
}

use mac_address::MacAddress;

use crate::messages::PowerCommand;

/// Failures reported by the radio backend.
#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    #[error(transparent)]
    Btle(#[from] btleplug::Error),
    #[error("no bluetooth adapter found")]
    NoAdapter,
    #[error("peripheral {0} is not known to the adapter")]
    UnknownPeripheral(MacAddress),
    #[error("power control service not found")]
    ServiceNotFound,
    #[error("power control characteristic not found")]
    CharacteristicNotFound,
    #[error("read returned {0} bytes, expected 1")]
    UnexpectedLength(usize),
    #[error("scan event stream closed before the window elapsed")]
    ScanEnded,
    #[error("station is not connected")]
    NotConnected,
    #[error("{0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bluetooth adapter unavailable")]
    Adapter(#[source] RadioError),
    #[error("failed to connect to {address}")]
    Connection {
        address: MacAddress,
        #[source]
        source: RadioError,
    },
    #[error("discovery failed for {address} after {attempts} attempt(s)")]
    Discovery {
        address: MacAddress,
        attempts: u32,
        #[source]
        source: RadioError,
    },
    #[error("failed to read power state of {address}")]
    Read {
        address: MacAddress,
        #[source]
        source: RadioError,
    },
    #[error("failed to write power {command} command to {address} after {attempts} attempt(s)")]
    Write {
        address: MacAddress,
        command: PowerCommand,
        attempts: u32,
        #[source]
        source: RadioError,
    },
    #[error("bluetooth scan failed with no results")]
    Scan(#[source] RadioError),
    #[error("scan already in progress")]
    AlreadyScanning,
    #[error("station with address {0} not found")]
    NotFound(String),
    #[error("encountered {failed} error(s) during power {command} all")]
    Bulk { command: PowerCommand, failed: usize },
}

impl Error {
    /// Unwraps the transport cause of a session failure.
    pub(crate) fn into_radio_error(self) -> RadioError {
        match self {
            Error::Adapter(source)
            | Error::Connection { source, .. }
            | Error::Discovery { source, .. }
            | Error::Read { source, .. }
            | Error::Write { source, .. }
            | Error::Scan(source) => source,
            other => RadioError::Transport(other.to_string()),
        }
    }
}

//! Power control for Bluetooth LE base stations.
//!
//! [`manager::Manager`] owns every station seen by a scan and fans radio work
//! out across them; [`station::Station`] drives one device's session.

pub mod config;
pub mod error;
pub mod manager;
pub mod messages;
pub mod radio;
pub mod registry;
pub mod scanner;
pub mod station;
pub mod timing;

pub use error::{Error, RadioError};
pub use manager::Manager;
pub use messages::{PowerCommand, PowerState, StationInfo};

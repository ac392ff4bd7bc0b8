//! Seam between station logic and the Bluetooth LE stack.
//!
//! [`btle`] talks to a real adapter through btleplug; the test-only `mock`
//! module scripts the same traits in memory.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use mac_address::MacAddress;
use uuid::Uuid;

use crate::error::RadioError;
use crate::messages::Advertisement;

pub mod btle;
#[cfg(test)]
pub(crate) mod mock;

/// Vendor service exposing the power control characteristic.
pub const POWER_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001523_1212_efde_1523_785feabcd124);
/// Single byte: 0x00 off, anything else on.
pub const POWER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x00001525_1212_efde_1523_785feabcd124);
/// Advertised local name prefix of a base station.
pub const NAME_PREFIX: &str = "LHB-";

pub type AdvertisementStream = BoxStream<'static, Result<Advertisement, RadioError>>;

/// Location of the control characteristic on a connected peripheral.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlAttribute {
    pub service: Uuid,
    pub characteristic: Uuid,
}

#[async_trait]
pub trait Radio: Send + Sync {
    /// Starts a discovery pass. The stream ends or yields an error when the
    /// pass terminates on its own.
    async fn start_scan(&self) -> Result<AdvertisementStream, RadioError>;

    async fn stop_scan(&self) -> Result<(), RadioError>;

    async fn connect(&self, address: MacAddress) -> Result<Arc<dyn Link>, RadioError>;
}

/// A live connection to one peripheral.
#[async_trait]
pub trait Link: Send + Sync {
    /// Returns the UUIDs of discovered services matching `service`.
    async fn discover_services(&self, service: Uuid) -> Result<Vec<Uuid>, RadioError>;

    async fn discover_characteristics(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<ControlAttribute>, RadioError>;

    async fn read(&self, attribute: &ControlAttribute) -> Result<Vec<u8>, RadioError>;

    async fn write_without_response(
        &self,
        attribute: &ControlAttribute,
        data: &[u8],
    ) -> Result<(), RadioError>;

    async fn disconnect(&self) -> Result<(), RadioError>;
}

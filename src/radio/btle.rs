use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central as _, CentralEvent, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt as _;
use log::{debug, info};
use mac_address::MacAddress;
use uuid::Uuid;

use super::{AdvertisementStream, ControlAttribute, Link, Radio};
use crate::error::{Error, RadioError};
use crate::messages::Advertisement;

/// Radio backed by a host Bluetooth adapter.
pub struct BtleRadio {
    adapter: Adapter,
}

impl BtleRadio {
    /// Opens the first adapter, or the first whose name contains `filter`.
    pub async fn initialize(filter: Option<&str>) -> Result<Self, Error> {
        Self::find_adapter(filter)
            .await
            .map(|adapter| BtleRadio { adapter })
            .map_err(Error::Adapter)
    }

    async fn find_adapter(filter: Option<&str>) -> Result<Adapter, RadioError> {
        let manager = Manager::new().await?;
        for adapter in manager.adapters().await? {
            let name = adapter.adapter_info().await?;
            if filter.is_none_or(|f| name.contains(f)) {
                info!("Using bluetooth adapter {}", name);
                return Ok(adapter);
            }
            debug!("Skipping bluetooth adapter {}", name);
        }
        Err(RadioError::NoAdapter)
    }
}

async fn advertisement(
    adapter: &Adapter,
    id: &PeripheralId,
) -> Result<Option<Advertisement>, RadioError> {
    let peripheral = adapter.peripheral(id).await?;
    let Some(properties) = peripheral.properties().await? else {
        return Ok(None);
    };
    Ok(properties.local_name.map(|name| Advertisement {
        address: MacAddress::new(properties.address.into_inner()),
        name,
    }))
}

#[async_trait]
impl Radio for BtleRadio {
    async fn start_scan(&self) -> Result<AdvertisementStream, RadioError> {
        // Subscribe before scanning so the first advertisements are not missed.
        let events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        let adapter = self.adapter.clone();
        let stream = events.filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => return None,
                };
                match advertisement(&adapter, &id).await {
                    Ok(advertisement) => advertisement.map(Ok),
                    Err(err) => {
                        debug!("Ignoring peripheral {:?}: {}", id, err);
                        None
                    }
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, address: MacAddress) -> Result<Arc<dyn Link>, RadioError> {
        let target = BDAddr::from(address.bytes());
        let peripheral = self
            .adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| p.address() == target)
            .ok_or(RadioError::UnknownPeripheral(address))?;

        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        Ok(Arc::new(BtleLink { peripheral }))
    }
}

struct BtleLink {
    peripheral: Peripheral,
}

impl BtleLink {
    fn characteristic(&self, attribute: &ControlAttribute) -> Result<Characteristic, RadioError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == attribute.characteristic && c.service_uuid == attribute.service)
            .ok_or(RadioError::CharacteristicNotFound)
    }
}

#[async_trait]
impl Link for BtleLink {
    async fn discover_services(&self, service: Uuid) -> Result<Vec<Uuid>, RadioError> {
        self.peripheral.discover_services().await?;
        Ok(self
            .peripheral
            .services()
            .into_iter()
            .filter(|s| s.uuid == service)
            .map(|s| s.uuid)
            .collect())
    }

    async fn discover_characteristics(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<ControlAttribute>, RadioError> {
        Ok(self
            .peripheral
            .services()
            .into_iter()
            .filter(|s| s.uuid == service)
            .flat_map(|s| s.characteristics)
            .filter(|c| c.uuid == characteristic)
            .map(|c| ControlAttribute {
                service: c.service_uuid,
                characteristic: c.uuid,
            })
            .collect())
    }

    async fn read(&self, attribute: &ControlAttribute) -> Result<Vec<u8>, RadioError> {
        let characteristic = self.characteristic(attribute)?;
        Ok(self.peripheral.read(&characteristic).await?)
    }

    async fn write_without_response(
        &self,
        attribute: &ControlAttribute,
        data: &[u8],
    ) -> Result<(), RadioError> {
        let characteristic = self.characteristic(attribute)?;
        self.peripheral
            .write(&characteristic, data, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), RadioError> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

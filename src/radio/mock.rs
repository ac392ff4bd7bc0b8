//! Scripted in-memory radio for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt as _;
use futures::stream;
use mac_address::MacAddress;
use uuid::Uuid;

use super::{
    AdvertisementStream, ControlAttribute, Link, POWER_CHARACTERISTIC_UUID, POWER_SERVICE_UUID,
    Radio,
};
use crate::error::RadioError;
use crate::messages::Advertisement;

pub(crate) fn addr(last: u8) -> MacAddress {
    MacAddress::new([0xC0, 0x11, 0x22, 0x33, 0x44, last])
}

/// Behaviour and observed traffic of one scripted peripheral.
#[derive(Clone, Debug, Default)]
pub(crate) struct MockDevice {
    /// Byte returned by reads; writes replace it.
    pub value: u8,
    pub latency: Duration,
    pub connect_failures: u32,
    pub discovery_failures: u32,
    pub read_failures: u32,
    pub write_failures: u32,
    /// Reads return two bytes instead of one.
    pub long_read: bool,

    pub connects: u32,
    pub disconnects: u32,
    pub writes: Vec<u8>,
}

impl MockDevice {
    pub fn with_value(value: u8) -> Self {
        MockDevice {
            value,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum ScanEvent {
    Seen(Advertisement),
    Fail(String),
}

#[derive(Default)]
pub(crate) struct MockRadio {
    devices: Mutex<HashMap<MacAddress, Arc<Mutex<MockDevice>>>>,
    scan_events: Mutex<Vec<ScanEvent>>,
    scan_start_error: Mutex<Option<String>>,
    /// The event stream closes after the scripted events.
    scan_ends: AtomicBool,
    pub stops: AtomicUsize,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&self, address: MacAddress, device: MockDevice) {
        self.devices
            .lock()
            .unwrap()
            .insert(address, Arc::new(Mutex::new(device)));
    }

    pub fn device(&self, address: MacAddress) -> MockDevice {
        self.handle(address).lock().unwrap().clone()
    }

    pub fn update(&self, address: MacAddress, f: impl FnOnce(&mut MockDevice)) {
        f(&mut self.handle(address).lock().unwrap());
    }

    fn handle(&self, address: MacAddress) -> Arc<Mutex<MockDevice>> {
        self.devices.lock().unwrap()[&address].clone()
    }

    pub fn advertise(&self, address: MacAddress, name: &str) {
        self.scan_events
            .lock()
            .unwrap()
            .push(ScanEvent::Seen(Advertisement {
                address,
                name: name.to_string(),
            }));
    }

    pub fn fail_scan(&self, message: &str) {
        self.scan_events
            .lock()
            .unwrap()
            .push(ScanEvent::Fail(message.to_string()));
    }

    pub fn end_scan_early(&self) {
        self.scan_ends.store(true, Ordering::SeqCst);
    }

    pub fn fail_scan_start(&self, message: &str) {
        *self.scan_start_error.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl Radio for MockRadio {
    async fn start_scan(&self) -> Result<AdvertisementStream, RadioError> {
        if let Some(message) = self.scan_start_error.lock().unwrap().clone() {
            return Err(RadioError::Transport(message));
        }
        let events = self.scan_events.lock().unwrap().clone();
        let items = events.into_iter().map(|event| match event {
            ScanEvent::Seen(advertisement) => Ok(advertisement),
            ScanEvent::Fail(message) => Err(RadioError::Transport(message)),
        });
        if self.scan_ends.load(Ordering::SeqCst) {
            return Ok(stream::iter(items).boxed());
        }
        // A real pass keeps running until it is stopped.
        Ok(stream::iter(items).chain(stream::pending()).boxed())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn connect(&self, address: MacAddress) -> Result<Arc<dyn Link>, RadioError> {
        let device = self
            .devices
            .lock()
            .unwrap()
            .get(&address)
            .cloned()
            .ok_or(RadioError::UnknownPeripheral(address))?;

        let latency = device.lock().unwrap().latency;
        tokio::time::sleep(latency).await;

        let mut state = device.lock().unwrap();
        state.connects += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(RadioError::Transport("connection refused".to_string()));
        }
        drop(state);
        Ok(Arc::new(MockLink { device }))
    }
}

struct MockLink {
    device: Arc<Mutex<MockDevice>>,
}

#[async_trait]
impl Link for MockLink {
    async fn discover_services(&self, service: Uuid) -> Result<Vec<Uuid>, RadioError> {
        let mut state = self.device.lock().unwrap();
        if state.discovery_failures > 0 {
            state.discovery_failures -= 1;
            return Ok(Vec::new());
        }
        Ok(vec![service].into_iter().filter(|s| *s == POWER_SERVICE_UUID).collect())
    }

    async fn discover_characteristics(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<ControlAttribute>, RadioError> {
        if characteristic != POWER_CHARACTERISTIC_UUID {
            return Ok(Vec::new());
        }
        Ok(vec![ControlAttribute {
            service,
            characteristic,
        }])
    }

    async fn read(&self, _attribute: &ControlAttribute) -> Result<Vec<u8>, RadioError> {
        let mut state = self.device.lock().unwrap();
        if state.read_failures > 0 {
            state.read_failures -= 1;
            return Err(RadioError::Transport("read timed out".to_string()));
        }
        if state.long_read {
            return Ok(vec![state.value, 0]);
        }
        Ok(vec![state.value])
    }

    async fn write_without_response(
        &self,
        _attribute: &ControlAttribute,
        data: &[u8],
    ) -> Result<(), RadioError> {
        let mut state = self.device.lock().unwrap();
        if state.write_failures > 0 {
            state.write_failures -= 1;
            return Err(RadioError::Transport("write failed".to_string()));
        }
        state.writes.extend_from_slice(data);
        if let Some(byte) = data.first() {
            state.value = *byte;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), RadioError> {
        self.device.lock().unwrap().disconnects += 1;
        Ok(())
    }
}

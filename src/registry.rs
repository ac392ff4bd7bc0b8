use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use log::info;
use mac_address::MacAddress;

use crate::station::Station;

/// Stations currently believed connected, tracked for bulk cleanup.
///
/// Membership is advisory: a station's own connection flag is authoritative.
/// Entries are weak, so the registry never keeps a station alive.
#[derive(Default)]
pub struct SessionRegistry {
    connected: Mutex<HashMap<MacAddress, Weak<Station>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, station: &Arc<Station>) {
        self.lock().insert(station.address(), Arc::downgrade(station));
    }

    pub(crate) fn remove(&self, address: &MacAddress) {
        self.lock().remove(address);
    }

    pub fn contains(&self, address: &MacAddress) -> bool {
        self.lock()
            .get(address)
            .is_some_and(|station| station.strong_count() > 0)
    }

    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|station| station.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disconnects every tracked station, one after another.
    pub async fn disconnect_all(&self) {
        // Copy out first: each disconnect re-enters the registry to deregister.
        let stations: Vec<Arc<Station>> = {
            let mut connected = self.lock();
            connected.retain(|_, station| station.strong_count() > 0);
            connected.values().filter_map(Weak::upgrade).collect()
        };
        info!("Disconnecting all {} tracked stations", stations.len());
        for station in stations {
            station.disconnect().await;
        }
        info!("Disconnect all stations finished");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<MacAddress, Weak<Station>>> {
        self.connected.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::mock::{MockDevice, MockRadio, addr};
    use crate::timing::Timings;

    #[tokio::test(start_paused = true)]
    async fn test_connect_and_disconnect_all() {
        let radio = Arc::new(MockRadio::new());
        radio.add_device(addr(1), MockDevice::with_value(1));
        radio.add_device(addr(2), MockDevice::with_value(0));
        let registry = Arc::new(SessionRegistry::new());

        let stations: Vec<Arc<Station>> = [1, 2]
            .into_iter()
            .map(|n| {
                Arc::new(Station::new(
                    addr(n),
                    format!("LHB-{n:08}"),
                    radio.clone(),
                    registry.clone(),
                    Timings::default(),
                ))
            })
            .collect();

        assert!(registry.is_empty());
        for station in &stations {
            station.fetch_initial_power_state().await.unwrap();
        }
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&addr(1)));

        registry.disconnect_all().await;
        assert!(registry.is_empty());
        for station in &stations {
            assert!(!station.is_connected());
        }
        assert_eq!(radio.device(addr(1)).disconnects, 1);
        assert_eq!(radio.device(addr(2)).disconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_does_not_keep_stations_alive() {
        let radio = Arc::new(MockRadio::new());
        radio.add_device(addr(1), MockDevice::with_value(1));
        let registry = Arc::new(SessionRegistry::new());
        let station = Arc::new(Station::new(
            addr(1),
            "LHB-A1".to_string(),
            radio.clone(),
            registry.clone(),
            Timings::default(),
        ));

        station.fetch_initial_power_state().await.unwrap();
        assert!(registry.contains(&addr(1)));

        let weak = Arc::downgrade(&station);
        drop(station);
        assert!(weak.upgrade().is_none());
        assert!(!registry.contains(&addr(1)));
        assert!(registry.is_empty());

        registry.disconnect_all().await;
        assert_eq!(radio.device(addr(1)).disconnects, 0);
    }

    #[tokio::test]
    async fn test_disconnect_all_empty() {
        let registry = SessionRegistry::new();
        registry.disconnect_all().await;
        assert!(registry.is_empty());
    }
}

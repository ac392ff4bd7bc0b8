use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::future::join_all;
use log::{debug, info, warn};
use mac_address::MacAddress;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::messages::{PowerCommand, StationInfo};
use crate::radio::Radio;
use crate::registry::SessionRegistry;
use crate::scanner::Scanner;
use crate::station::Station;
use crate::timing::Timings;

/// Owns every known station and runs bulk operations across them.
pub struct Manager {
    radio: Arc<dyn Radio>,
    registry: Arc<SessionRegistry>,
    scanner: Scanner,
    timings: Timings,
    stations: RwLock<HashMap<MacAddress, Arc<Station>>>,
    renamed_stations: RwLock<HashMap<String, String>>,
    scanning: AtomicBool,
}

/// Clears the scanning flag however the scan exits.
struct ScanGuard<'a>(&'a AtomicBool);

impl<'a> ScanGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ScanGuard(flag))
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
        debug!("Scan finished, scanning flag cleared");
    }
}

impl Manager {
    pub fn new(radio: Arc<dyn Radio>, timings: Timings) -> Self {
        Manager {
            scanner: Scanner::new(radio.clone()),
            radio,
            registry: Arc::new(SessionRegistry::new()),
            timings,
            stations: RwLock::new(HashMap::new()),
            renamed_stations: RwLock::new(HashMap::new()),
            scanning: AtomicBool::new(false),
        }
    }

    pub fn with_renamed_stations(self, renamed_stations: HashMap<String, String>) -> Self {
        *self
            .renamed_stations
            .write()
            .unwrap_or_else(PoisonError::into_inner) = renamed_stations;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    pub fn station(&self, address: &str) -> Option<Arc<Station>> {
        let address: MacAddress = address.parse().ok()?;
        self.read_stations().get(&address).cloned()
    }

    /// Scans, merges results into the station map and fetches the state of
    /// every new or disconnected station, waiting at most the fetch deadline.
    pub async fn scan_and_merge(&self) -> Result<Vec<StationInfo>, Error> {
        let Some(_guard) = ScanGuard::acquire(&self.scanning) else {
            info!("Scan already in progress, ignoring request");
            return Err(Error::AlreadyScanning);
        };

        debug!("Waiting {:?} before scanning", self.timings.pre_scan_settle);
        tokio::time::sleep(self.timings.pre_scan_settle).await;

        let discovered = self
            .scanner
            .scan_for_duration(self.timings.scan_window)
            .await?;

        let to_fetch = {
            let mut stations = self.write_stations();
            let mut to_fetch = Vec::new();
            for advertisement in discovered {
                match stations.get(&advertisement.address) {
                    Some(existing) => {
                        existing.set_name(&advertisement.name);
                        if !existing.is_connected() {
                            to_fetch.push(existing.clone());
                        }
                    }
                    None => {
                        info!(
                            "New station {} ({})",
                            advertisement.name, advertisement.address
                        );
                        let station = Arc::new(Station::new(
                            advertisement.address,
                            advertisement.name,
                            self.radio.clone(),
                            self.registry.clone(),
                            self.timings,
                        ));
                        stations.insert(advertisement.address, station.clone());
                        to_fetch.push(station);
                    }
                }
            }
            to_fetch
        };

        let handles: Vec<_> = to_fetch
            .into_iter()
            .map(|station| spawn_logged(station, "initial fetch", fetch))
            .collect();
        wait_with_deadline(handles, self.timings.scan_fetch_deadline, "state fetch").await;

        Ok(self.snapshot())
    }

    /// Reads connected stations and fetches disconnected ones, waiting at most
    /// the status check deadline.
    pub async fn check_all_statuses(&self) -> Vec<StationInfo> {
        let handles: Vec<_> = self
            .all_stations()
            .into_iter()
            .map(|station| {
                if station.is_connected() {
                    spawn_logged(station, "status read", read)
                } else {
                    spawn_logged(station, "status fetch", fetch)
                }
            })
            .collect();
        wait_with_deadline(handles, self.timings.status_check_deadline, "status check").await;

        self.snapshot()
    }

    pub async fn power_on_station(&self, address: &str) -> Result<(), Error> {
        self.set_station(address, PowerCommand::On).await
    }

    pub async fn power_off_station(&self, address: &str) -> Result<(), Error> {
        self.set_station(address, PowerCommand::Off).await
    }

    pub async fn power_on_all(&self) -> Result<(), Error> {
        self.set_all(PowerCommand::On).await
    }

    pub async fn power_off_all(&self) -> Result<(), Error> {
        self.set_all(PowerCommand::Off).await
    }

    async fn set_station(&self, address: &str, command: PowerCommand) -> Result<(), Error> {
        let station = self
            .station(address)
            .ok_or_else(|| Error::NotFound(address.to_string()))?;
        station.set_power_state(command).await
    }

    /// Runs the command on every station concurrently and waits for all of
    /// them. Failures are only counted.
    async fn set_all(&self, command: PowerCommand) -> Result<(), Error> {
        let handles: Vec<JoinHandle<(MacAddress, Result<(), Error>)>> = self
            .all_stations()
            .into_iter()
            .map(|station| {
                tokio::spawn(async move {
                    let result = station.set_power_state(command).await;
                    (station.address(), result)
                })
            })
            .collect();

        let mut failed = 0;
        for joined in join_all(handles).await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((address, Err(err))) => {
                    warn!("Power {} failed for {}: {}", command, address, err);
                    failed += 1;
                }
                Err(err) => {
                    warn!("Power {} task failed: {}", command, err);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(Error::Bulk { command, failed });
        }
        Ok(())
    }

    /// Current view of every station. Never touches the radio.
    pub fn snapshot(&self) -> Vec<StationInfo> {
        let renamed = self
            .renamed_stations
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut infos: Vec<StationInfo> = self
            .read_stations()
            .values()
            .map(|station| {
                let status = station.status();
                StationInfo {
                    name: renamed
                        .get(&status.name)
                        .cloned()
                        .unwrap_or_else(|| status.name.clone()),
                    original_name: status.name,
                    address: station.address().to_string(),
                    power_state: status.power_state,
                }
            })
            .collect();
        infos.sort_by(|a, b| {
            (&a.original_name, &a.address).cmp(&(&b.original_name, &b.address))
        });
        infos
    }

    /// Sets or, with an empty name, clears the display name of a station.
    pub fn rename_station(&self, original_name: &str, name: &str) {
        let mut renamed = self
            .renamed_stations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if name.is_empty() {
            renamed.remove(original_name);
        } else {
            renamed.insert(original_name.to_string(), name.to_string());
        }
    }

    pub async fn shutdown(&self) {
        self.registry.disconnect_all().await;
    }

    fn all_stations(&self) -> Vec<Arc<Station>> {
        self.read_stations().values().cloned().collect()
    }

    fn read_stations(&self) -> std::sync::RwLockReadGuard<'_, HashMap<MacAddress, Arc<Station>>> {
        self.stations.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_stations(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<MacAddress, Arc<Station>>> {
        self.stations.write().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn fetch(station: Arc<Station>) -> Result<(), Error> {
    station.fetch_initial_power_state().await
}

async fn read(station: Arc<Station>) -> Result<(), Error> {
    station.read_power_state().await
}

/// Spawns a station operation whose failure is only logged.
fn spawn_logged<F, Fut>(station: Arc<Station>, what: &'static str, op: F) -> JoinHandle<()>
where
    F: FnOnce(Arc<Station>) -> Fut,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    let address = station.address();
    let operation = op(station);
    tokio::spawn(async move {
        if let Err(err) = operation.await {
            debug!("Background {} for {} failed: {}", what, address, err);
        }
    })
}

/// Waits for the tasks or the deadline, whichever comes first. Tasks still
/// running at the deadline are left to finish on their own.
async fn wait_with_deadline(handles: Vec<JoinHandle<()>>, deadline: Duration, what: &str) {
    if handles.is_empty() {
        return;
    }
    if tokio::time::timeout(deadline, join_all(handles)).await.is_err() {
        warn!("Timed out waiting for {} tasks", what);
    }
}

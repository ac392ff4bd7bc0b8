//! One base station and the session used to control its power.
//!
//! Every radio operation holds the station's session lock for its full
//! duration, so calls against the same station serialize. The summary fields
//! (name, power state, connection flag) sit behind a separate short-lived lock
//! that is only ever held while copying, which keeps snapshots off the radio.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use log::{debug, info, warn};
use mac_address::MacAddress;
use tokio::sync::Mutex;

use crate::error::{Error, RadioError};
use crate::messages::{PowerCommand, PowerState};
use crate::radio::{ControlAttribute, Link, POWER_CHARACTERISTIC_UUID, POWER_SERVICE_UUID, Radio};
use crate::registry::SessionRegistry;
use crate::timing::Timings;

/// Copy of a station's observable fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StationStatus {
    pub name: String,
    pub power_state: PowerState,
    /// Most recent successful state determination.
    pub last_state_update: Option<SystemTime>,
    pub connected: bool,
}

#[derive(Default)]
struct Session {
    link: Option<Arc<dyn Link>>,
    control: Option<ControlAttribute>,
}

impl Session {
    fn is_live(&self) -> bool {
        self.link.is_some() && self.control.is_some()
    }

    fn is_empty(&self) -> bool {
        self.link.is_none() && self.control.is_none()
    }
}

pub struct Station {
    address: MacAddress,
    radio: Arc<dyn Radio>,
    registry: Arc<SessionRegistry>,
    timings: Timings,
    session: Mutex<Session>,
    status: RwLock<StationStatus>,
}

impl Station {
    pub fn new(
        address: MacAddress,
        name: String,
        radio: Arc<dyn Radio>,
        registry: Arc<SessionRegistry>,
        timings: Timings,
    ) -> Self {
        Station {
            address,
            radio,
            registry,
            timings,
            session: Mutex::new(Session::default()),
            status: RwLock::new(StationStatus {
                name,
                power_state: PowerState::Unknown,
                last_state_update: None,
                connected: false,
            }),
        }
    }

    pub fn address(&self) -> MacAddress {
        self.address
    }

    pub fn status(&self) -> StationStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn name(&self) -> String {
        self.status().name
    }

    pub(crate) fn set_name(&self, name: &str) {
        let mut status = self.status_mut();
        if status.name != name {
            debug!("Station {} renamed from {} to {}", self.address, status.name, name);
            status.name = name.to_string();
        }
    }

    pub fn power_state(&self) -> PowerState {
        self.status().power_state
    }

    pub fn is_connected(&self) -> bool {
        self.status().connected
    }

    /// Connects and discovers the control attribute unless already live.
    pub async fn connect_and_discover(self: &Arc<Self>) -> Result<(), Error> {
        let mut session = self.session.lock().await;
        self.connect_locked(&mut session).await
    }

    /// Reads the power state over an already live session.
    pub async fn read_power_state(&self) -> Result<(), Error> {
        let mut session = self.session.lock().await;
        self.read_locked(&mut session).await
    }

    /// Connects if needed, then reads, without letting another call interleave.
    pub async fn fetch_initial_power_state(self: &Arc<Self>) -> Result<(), Error> {
        let mut session = self.session.lock().await;
        if let Err(err) = self.connect_locked(&mut session).await {
            debug!("Initial fetch for {} failed to connect: {}", self.name(), err);
            return Err(err);
        }
        if let Err(err) = self.read_locked(&mut session).await {
            debug!("Initial fetch for {} failed to read: {}", self.name(), err);
            return Err(err);
        }
        debug!(
            "Initial fetch for {} succeeded: {}",
            self.name(),
            self.power_state()
        );
        Ok(())
    }

    pub async fn power_on(self: &Arc<Self>) -> Result<(), Error> {
        self.set_power_state(PowerCommand::On).await
    }

    pub async fn power_off(self: &Arc<Self>) -> Result<(), Error> {
        self.set_power_state(PowerCommand::Off).await
    }

    /// Writes the command byte, reconnecting between attempts, then reads the
    /// state back. A failed read-back does not fail the call.
    pub async fn set_power_state(self: &Arc<Self>, command: PowerCommand) -> Result<(), Error> {
        let mut session = self.session.lock().await;
        let attempts = self.timings.write_attempts;
        let mut last_error = RadioError::NotConnected;

        let mut written = false;
        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.timings.retry_backoff).await;
            }

            if let Err(err) = self.connect_locked(&mut session).await {
                warn!(
                    "Connect failed during power {} attempt {}/{} for {}: {}",
                    command,
                    attempt,
                    attempts,
                    self.name(),
                    err
                );
                self.disconnect_locked(&mut session).await;
                last_error = err.into_radio_error();
                continue;
            }

            let (Some(link), Some(control)) = (session.link.clone(), session.control) else {
                warn!(
                    "No live session for power {} attempt {}/{} on {}",
                    command,
                    attempt,
                    attempts,
                    self.name()
                );
                self.disconnect_locked(&mut session).await;
                last_error = RadioError::NotConnected;
                continue;
            };
            debug!("Sending power {} command to {}", command, self.name());
            match link
                .write_without_response(&control, &[command.byte()])
                .await
            {
                Ok(()) => {
                    written = true;
                    break;
                }
                Err(err) => {
                    warn!(
                        "Write power {} failed for {} (attempt {}/{}): {}",
                        command,
                        self.name(),
                        attempt,
                        attempts,
                        err
                    );
                    self.disconnect_locked(&mut session).await;
                    last_error = err;
                }
            }
        }

        if !written {
            return Err(Error::Write {
                address: self.address,
                command,
                attempts,
                source: last_error,
            });
        }

        self.record_power_state(command.into());
        tokio::time::sleep(self.timings.write_settle).await;
        if let Err(err) = self.read_locked(&mut session).await {
            warn!(
                "Failed to read back state after power {} for {}: {} (state may be stale)",
                command,
                self.name(),
                err
            );
        }
        Ok(())
    }

    /// Releases the session. No-op when not connected.
    pub async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        if session.is_empty() {
            return;
        }
        self.disconnect_locked(&mut session).await;
    }

    async fn connect_locked(self: &Arc<Self>, session: &mut Session) -> Result<(), Error> {
        if session.is_live() {
            return Ok(());
        }

        let link = match session.link.clone() {
            Some(link) => link,
            None => {
                debug!("Connecting to {} ({})", self.name(), self.address);
                match self.radio.connect(self.address).await {
                    Ok(link) => {
                        info!("Connected to {} ({})", self.name(), self.address);
                        session.link = Some(link.clone());
                        self.registry.insert(self);
                        link
                    }
                    Err(source) => {
                        *session = Session::default();
                        let mut status = self.status_mut();
                        status.connected = false;
                        status.power_state = PowerState::Unknown;
                        return Err(Error::Connection {
                            address: self.address,
                            source,
                        });
                    }
                }
            }
        };

        if session.control.is_none() {
            match self.discover_control(&*link).await {
                Ok(control) => session.control = Some(control),
                Err(source) => {
                    self.disconnect_locked(session).await;
                    return Err(Error::Discovery {
                        address: self.address,
                        attempts: self.timings.discovery_attempts,
                        source,
                    });
                }
            }
            debug!("Discovered power control on {}", self.name());
        }

        self.status_mut().connected = true;
        Ok(())
    }

    async fn discover_control(&self, link: &dyn Link) -> Result<ControlAttribute, RadioError> {
        let attempts = self.timings.discovery_attempts;
        let mut last_error = RadioError::ServiceNotFound;
        for attempt in 1..=attempts {
            if attempt > 1 {
                debug!(
                    "Retrying discovery for {} (attempt {}/{})",
                    self.name(),
                    attempt,
                    attempts
                );
                tokio::time::sleep(self.timings.retry_backoff).await;
            }
            match discover_once(link).await {
                Ok(control) => return Ok(control),
                Err(err) => last_error = err,
            }
        }
        Err(last_error)
    }

    async fn read_locked(&self, session: &mut Session) -> Result<(), Error> {
        let (Some(link), Some(control)) = (session.link.clone(), session.control) else {
            return Err(Error::Read {
                address: self.address,
                source: RadioError::NotConnected,
            });
        };

        let bytes = match link.read(&control).await {
            Ok(bytes) if bytes.len() == 1 => bytes,
            Ok(bytes) => return Err(self.read_failed(RadioError::UnexpectedLength(bytes.len()))),
            Err(err) => return Err(self.read_failed(err)),
        };

        let byte = bytes[0];
        if byte > 1 {
            debug!("Read state {:#04x} from {}, treating as on", byte, self.name());
        }
        let state = PowerState::from_byte(byte);
        let previous = self.record_power_state(state);
        if previous != state {
            info!(
                "Power state for {} changed from {} to {}",
                self.name(),
                previous,
                state
            );
        }
        Ok(())
    }

    fn read_failed(&self, source: RadioError) -> Error {
        self.status_mut().power_state = PowerState::Unknown;
        Error::Read {
            address: self.address,
            source,
        }
    }

    async fn disconnect_locked(&self, session: &mut Session) {
        if let Some(link) = session.link.take() {
            debug!("Disconnecting {} ({})", self.name(), self.address);
            if let Err(err) = link.disconnect().await {
                warn!("Error disconnecting {}: {}", self.name(), err);
            }
        }
        session.control = None;
        {
            let mut status = self.status_mut();
            status.connected = false;
            status.power_state = PowerState::Unknown;
        }
        self.registry.remove(&self.address);
    }

    /// Records a determined state, returning the previous one.
    fn record_power_state(&self, state: PowerState) -> PowerState {
        let mut status = self.status_mut();
        status.last_state_update = Some(SystemTime::now());
        std::mem::replace(&mut status.power_state, state)
    }

    fn status_mut(&self) -> std::sync::RwLockWriteGuard<'_, StationStatus> {
        self.status.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    async fn handles_consistent(&self) -> bool {
        let session = self.session.lock().await;
        self.is_connected() == session.is_live() && (session.is_live() || session.is_empty())
    }
}

async fn discover_once(link: &dyn Link) -> Result<ControlAttribute, RadioError> {
    let service = link
        .discover_services(POWER_SERVICE_UUID)
        .await?
        .into_iter()
        .next()
        .ok_or(RadioError::ServiceNotFound)?;
    link.discover_characteristics(service, POWER_CHARACTERISTIC_UUID)
        .await?
        .into_iter()
        .next()
        .ok_or(RadioError::CharacteristicNotFound)
}

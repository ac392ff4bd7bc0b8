use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt as _;
use log::{debug, info, warn};
use mac_address::MacAddress;

use crate::error::{Error, RadioError};
use crate::messages::Advertisement;
use crate::radio::{NAME_PREFIX, Radio};

/// Time-bounded discovery of base stations.
pub struct Scanner {
    radio: Arc<dyn Radio>,
    name_prefix: String,
}

impl Scanner {
    pub fn new(radio: Arc<dyn Radio>) -> Self {
        Scanner {
            radio,
            name_prefix: NAME_PREFIX.to_string(),
        }
    }

    /// Listens for exactly `duration`, returning one entry per address with
    /// the most recently advertised name. A transport error only fails the
    /// scan when nothing was found.
    pub async fn scan_for_duration(&self, duration: Duration) -> Result<Vec<Advertisement>, Error> {
        info!("Scanning for {:?}", duration);
        let mut found: HashMap<MacAddress, Advertisement> = HashMap::new();
        let scan_error = match self.radio.start_scan().await {
            Ok(events) => {
                let result = self.collect(events, duration, &mut found).await;
                if let Err(err) = self.radio.stop_scan().await {
                    warn!("Failed to stop scan: {}", err);
                }
                result.err()
            }
            Err(err) => Some(err),
        };

        match scan_error {
            Some(err) if found.is_empty() => {
                warn!("Scan finished with error and no stations: {}", err);
                return Err(Error::Scan(err));
            }
            Some(err) => warn!("Scan finished with error: {}", err),
            None => debug!("Scan window elapsed"),
        }

        info!("Scan finished, found {} stations", found.len());
        Ok(found.into_values().collect())
    }

    async fn collect(
        &self,
        mut events: crate::radio::AdvertisementStream,
        duration: Duration,
        found: &mut HashMap<MacAddress, Advertisement>,
    ) -> Result<(), RadioError> {
        let window = tokio::time::sleep(duration);
        tokio::pin!(window);

        loop {
            tokio::select! {
                _ = &mut window => return Ok(()),
                event = events.next() => match event {
                    Some(Ok(advertisement)) if self.matches(&advertisement) => {
                        if !found.contains_key(&advertisement.address) {
                            debug!(
                                "Discovered {} ({})",
                                advertisement.name, advertisement.address
                            );
                        }
                        found.insert(advertisement.address, advertisement);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err),
                    None => return Err(RadioError::ScanEnded),
                },
            }
        }
    }

    fn matches(&self, advertisement: &Advertisement) -> bool {
        advertisement.name.starts_with(&self.name_prefix)
            && advertisement.address != MacAddress::new([0; 6])
    }
}

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use log::debug;
use serde_derive::{Deserialize, Serialize};

use crate::timing::Timings;

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
pub struct AppConfig {
    /// Substring of the adapter name to use; the first adapter otherwise.
    pub adapter: Option<String>,
    pub timing: Option<TimingConfig>,
    /// Original advertised name -> display name.
    #[serde(default)]
    pub renamed_stations: HashMap<String, String>,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone)]
pub struct TimingConfig {
    pub retry_backoff_ms: Option<u64>,
    pub pre_scan_settle_ms: Option<u64>,
    pub scan_window_ms: Option<u64>,
    pub write_settle_ms: Option<u64>,
    pub scan_fetch_deadline_ms: Option<u64>,
    pub status_check_deadline_ms: Option<u64>,
    pub discovery_attempts: Option<u32>,
    pub write_attempts: Option<u32>,
}

impl TimingConfig {
    pub fn resolve(&self) -> Timings {
        let defaults = Timings::default();
        let ms = |value: Option<u64>, default: Duration| {
            value.map(Duration::from_millis).unwrap_or(default)
        };
        Timings {
            retry_backoff: ms(self.retry_backoff_ms, defaults.retry_backoff),
            pre_scan_settle: ms(self.pre_scan_settle_ms, defaults.pre_scan_settle),
            scan_window: ms(self.scan_window_ms, defaults.scan_window),
            write_settle: ms(self.write_settle_ms, defaults.write_settle),
            scan_fetch_deadline: ms(self.scan_fetch_deadline_ms, defaults.scan_fetch_deadline),
            status_check_deadline: ms(
                self.status_check_deadline_ms,
                defaults.status_check_deadline,
            ),
            // Zero attempts would never touch the radio.
            discovery_attempts: self
                .discovery_attempts
                .unwrap_or(defaults.discovery_attempts)
                .max(1),
            write_attempts: self.write_attempts.unwrap_or(defaults.write_attempts).max(1),
        }
    }
}

impl AppConfig {
    /// Loads the config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(AppConfig::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::de::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::ser::to_string_pretty(self).context("serializing config")?;
        debug!("Saving config to {}", path.display());
        std::fs::write(path, contents)
            .with_context(|| format!("writing config file {}", path.display()))
    }

    pub fn timings(&self) -> Timings {
        self.timing.clone().unwrap_or_default().resolve()
    }

    /// An empty name clears the override.
    pub fn rename_station(&mut self, original: &str, name: Option<&str>) {
        match name.filter(|n| !n.is_empty()) {
            Some(name) => {
                self.renamed_stations
                    .insert(original.to_string(), name.to_string());
            }
            None => {
                self.renamed_stations.remove(original);
            }
        }
    }
}

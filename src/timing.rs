use std::time::Duration;

/// Pause between discovery and write retries.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(500);
/// Lets the radio settle after prior operations before a scan starts.
pub const PRE_SCAN_SETTLE: Duration = Duration::from_secs(1);
pub const SCAN_WINDOW: Duration = Duration::from_secs(5);
/// Delay between a power write and the reconciling read.
pub const WRITE_SETTLE: Duration = Duration::from_millis(100);
/// Soft deadline for the initial fetches scheduled by a scan.
pub const SCAN_FETCH_DEADLINE: Duration = Duration::from_secs(7);
/// Soft deadline for a status sweep.
pub const STATUS_CHECK_DEADLINE: Duration = Duration::from_secs(4);

pub const DISCOVERY_ATTEMPTS: u32 = 3;
pub const WRITE_ATTEMPTS: u32 = 2;

/// Every pacing knob used by stations and the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub retry_backoff: Duration,
    pub pre_scan_settle: Duration,
    pub scan_window: Duration,
    pub write_settle: Duration,
    pub scan_fetch_deadline: Duration,
    pub status_check_deadline: Duration,
    pub discovery_attempts: u32,
    pub write_attempts: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            retry_backoff: RETRY_BACKOFF,
            pre_scan_settle: PRE_SCAN_SETTLE,
            scan_window: SCAN_WINDOW,
            write_settle: WRITE_SETTLE,
            scan_fetch_deadline: SCAN_FETCH_DEADLINE,
            status_check_deadline: STATUS_CHECK_DEADLINE,
            discovery_attempts: DISCOVERY_ATTEMPTS,
            write_attempts: WRITE_ATTEMPTS,
        }
    }
}

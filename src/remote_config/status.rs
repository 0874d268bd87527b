//! Integer fetch-status flags combining the last fetch outcome with whether values are cached.

use super::{FirebaseRemoteConfig, LastFetchStatus};
use std::time::Duration;

/// Values from some earlier fetch are available.
pub const FETCH_STATUS_HAS_VALUES: u32 = 1 << 6;

/// The fetch completed.
pub const FETCH_STATUS_FLAG_COMPLETED: u32 = (1 << 1) | FETCH_STATUS_HAS_VALUES;

/// The fetch failed but earlier values are still served.
pub const FETCH_STATUS_FLAG_CACHED: u32 = (1 << 2) | FETCH_STATUS_HAS_VALUES;

/// The fetch failed.
pub const FETCH_STATUS_FLAG_FAILED: u32 = 1 << 3;

/// Activation failed.
pub const FETCH_STATUS_FLAG_ACTIVATE: u32 = 1 << 5;

fn failure_flags(status: LastFetchStatus) -> u32 {
    let mut flags = FETCH_STATUS_FLAG_FAILED | FETCH_STATUS_FLAG_ACTIVATE;
    if status != LastFetchStatus::NoFetchYet {
        // Some fetch went through before, so values are presumably cached.
        flags |= FETCH_STATUS_HAS_VALUES;
    }
    flags
}

impl FirebaseRemoteConfig {
    /// Status flags derived from the last fetch.
    pub fn fetch_status(&self) -> u32 {
        match self.info().last_fetch_status {
            LastFetchStatus::Success => FETCH_STATUS_HAS_VALUES | FETCH_STATUS_FLAG_CACHED,
            status => failure_flags(status),
        }
    }

    /// Activates the fetched values and reports the result as status flags.
    pub fn force_activate(&self) -> u32 {
        if self.activate() {
            FETCH_STATUS_FLAG_COMPLETED | FETCH_STATUS_FLAG_CACHED
        } else {
            failure_flags(self.info().last_fetch_status)
        }
    }

    /// Fetches and activates, reporting the result as status flags instead of an error.
    pub async fn fetch_and_activate_status(&self, minimum_fetch_interval: Duration) -> u32 {
        match self.fetch(minimum_fetch_interval).await {
            Ok(()) => {
                if self.activate() || self.info().last_fetch_status != LastFetchStatus::NoFetchYet {
                    FETCH_STATUS_FLAG_COMPLETED
                } else {
                    FETCH_STATUS_FLAG_FAILED | FETCH_STATUS_FLAG_ACTIVATE
                }
            }
            Err(_) => self.force_activate(),
        }
    }
}

use crate::config::seconds;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// seconds between the start of two sweeps
    #[serde(default = "default_interval", with = "seconds")]
    pub interval: Duration,

    /// number of days (today included) to look back for messages
    ///
    /// day logs older than this are deleted
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// number of sweeps of a past day after which it is not polled
    /// anymore. The current day is always polled.
    #[serde(default = "default_passes_per_day")]
    pub passes_per_day: u32,

    /// number of slots fetched past the last received message
    #[serde(default = "default_poll_ahead")]
    pub poll_ahead: u64,
}

fn default_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_lookback_days() -> u32 {
    30
}

fn default_passes_per_day() -> u32 {
    3
}

fn default_poll_ahead() -> u64 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            lookback_days: default_lookback_days(),
            passes_per_day: default_passes_per_day(),
            poll_ahead: default_poll_ahead(),
        }
    }
}

use crate::{poller, sender, session, storage};
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub session: session::Config,

    #[serde(default)]
    pub storage: storage::Config,

    #[serde(default)]
    pub poller: poller::Config,

    #[serde(default)]
    pub sender: sender::Config,
}

impl Config {
    pub const EXAMPLE: &'static str = include_str!("config.yaml");

    pub fn from_file<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Cannot open file: {}", path.display()))?;
        serde_yaml::from_reader(file)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }
}

/// (de)serialize a [`Duration`] as a number of seconds
///
/// [`Duration`]: std::time::Duration
pub(crate) mod seconds {
    use serde::{Deserialize as _, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn load_example() {
        let example = Config::EXAMPLE;

        let config: Config = serde_yaml::from_str(example).expect("Valid example");
        assert_eq!(config.poller.interval, Duration::from_secs(60));
        assert_eq!(config.sender.max_attempts, 10);
    }

    #[test]
    fn defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.session.address, "127.0.0.1:9481");
        assert_eq!(config.session.reconnect_backoff, Duration::from_secs(10));
        assert_eq!(config.poller.lookback_days, 30);
        assert_eq!(config.poller.passes_per_day, 3);
        assert_eq!(config.poller.poll_ahead, 3);
        assert_eq!(config.sender.min_cycle, Duration::from_secs(60));
        assert!(config.sender.gateway.is_none());
    }

    #[test]
    fn unknown_fields_are_refused() {
        assert!(serde_yaml::from_str::<Config>("poller:\n  interval: 5\n  speed: 3\n").is_err());
    }
}

use crate::config::seconds;
use dropmail_lib::EmailAddress;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// minimum number of seconds between the start of two sweeps of the
    /// outboxes. Enqueuing a message starts a sweep right away.
    #[serde(default = "default_min_cycle", with = "seconds")]
    pub min_cycle: Duration,

    /// number of failed attempts after which the message is bounced
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// messages for addresses outside of the native domain are sent to
    /// this address instead, with the actual recipient in the headers
    #[serde(default)]
    pub gateway: Option<EmailAddress>,

    /// domain of the addresses reachable through the storage network
    #[serde(default = "default_native_domain")]
    pub native_domain: String,
}

fn default_min_cycle() -> Duration {
    Duration::from_secs(60)
}

fn default_max_attempts() -> u32 {
    10
}

fn default_native_domain() -> String {
    "dropmail".to_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_cycle: default_min_cycle(),
            max_attempts: default_max_attempts(),
            gateway: None,
            native_domain: default_native_domain(),
        }
    }
}

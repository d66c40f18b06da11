use crate::config::seconds;
use dropmail_network::{ConnectionSettings, SessionConnection};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// connection with the local storage node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// address of the session interface of the node
    #[serde(default = "default_address")]
    pub address: String,

    /// seconds to wait before reconnecting after the connection with
    /// the node is lost or cannot be established
    #[serde(default = "default_reconnect_backoff", with = "seconds")]
    pub reconnect_backoff: Duration,

    /// seconds to wait for the node to answer the hello
    #[serde(default = "default_handshake_timeout", with = "seconds")]
    pub handshake_timeout: Duration,
}

fn default_address() -> String {
    "127.0.0.1:9481".to_owned()
}

fn default_reconnect_backoff() -> Duration {
    Duration::from_secs(10)
}

fn default_handshake_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: default_address(),
            reconnect_backoff: default_reconnect_backoff(),
            handshake_timeout: default_handshake_timeout(),
        }
    }
}

impl Config {
    /// create the (not yet started) connection, received payloads are
    /// staged in `temp_dir`
    pub fn connection(&self, temp_dir: &Path) -> SessionConnection {
        SessionConnection::new(ConnectionSettings {
            address: self.address.clone(),
            reconnect_backoff: self.reconnect_backoff,
            handshake_timeout: self.handshake_timeout,
            temp_dir: temp_dir.to_path_buf(),
        })
    }
}

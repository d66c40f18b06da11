use anyhow::{Context as _, Result};
use dropmail_storage::Storage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// directory of the accounts
    ///
    /// created if it does not exist yet
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// directory where in-flight payloads are staged
    ///
    /// should be on the same filesystem as `data_dir`
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            temp_dir: default_temp_dir(),
        }
    }
}

impl Config {
    pub fn open(&self) -> Result<Storage> {
        Storage::open(&self.data_dir, &self.temp_dir).context("Cannot open the storage")
    }
}

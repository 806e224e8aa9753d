//! Host settings: where the peripheral manager lives and how the board is set up

use std::time::Duration;

use rhodium_core::FrontendConfig;
use serde::{Deserialize, Serialize};

/// Default peripheral manager RPC endpoint
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:49601";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportConfig {
    /// `host:port` of the peripheral manager
    pub address: String,
    /// 0 waits for the operating system's connect timeout
    pub connect_timeout_ms: u64,
    /// 0 blocks without limit on reads and writes
    pub io_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            address: DEFAULT_ADDRESS.to_string(),
            connect_timeout_ms: 2000,
            io_timeout_ms: 5000,
        }
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        millis(self.io_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostConfig {
    pub transport: TransportConfig,
    pub frontend: FrontendConfig,
}

impl HostConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

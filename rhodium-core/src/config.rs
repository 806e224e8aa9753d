//! Frontend controller settings

use serde::{Deserialize, Serialize};

/// Static parameters of one daughterboard instance.
///
/// Every field has a default so a partial document deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrontendConfig {
    /// Daughterboard slot name, used in `dboards/<slot>`
    pub radio_slot: String,
    /// Radio block whose `args/spp` receives the derived packet size
    pub block_id: String,
    pub num_rx_channels: usize,
    pub num_tx_channels: usize,
    /// Prepended to every peripheral manager method name
    pub rpc_prefix: String,
    pub master_clock_rate: f64,
    /// Receive MTU in bytes, used when the tree has no `mtu/recv` yet
    pub recv_mtu: usize,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        FrontendConfig {
            radio_slot: "A".to_string(),
            block_id: "radio_0".to_string(),
            num_rx_channels: 1,
            num_tx_channels: 1,
            rpc_prefix: "db_0_".to_string(),
            master_clock_rate: 245.76e6,
            recv_mtu: 8000,
        }
    }
}

impl FrontendConfig {
    /// Full method name for `method` on this board's RPC namespace
    pub fn rpc_method(&self, method: &str) -> String {
        format!("{}{}", self.rpc_prefix, method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_uses_defaults() {
        let cfg: FrontendConfig =
            serde_json::from_str(r#"{"radioSlot": "B", "numRxChannels": 2}"#).unwrap();
        assert_eq!(cfg.radio_slot, "B");
        assert_eq!(cfg.num_rx_channels, 2);
        assert_eq!(cfg.num_tx_channels, 1);
        assert_eq!(cfg.rpc_method("get_sensors"), "db_0_get_sensors");
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(FrontendConfig::default()).unwrap();
        assert_eq!(json["masterClockRate"], 245.76e6);
        assert_eq!(json["recvMtu"], 8000);
    }
}

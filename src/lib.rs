//! # Rhodium
//!
//! Host shell for the Rhodium RF daughterboard control plane.
//!
//! All frontend logic lives in [`rhodium_core`]. This crate adds what the
//! core deliberately leaves out: a real network connection to the
//! peripheral manager and the host-side configuration that ties it to the
//! frontend settings.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                       rhodium                          │
//! │  ┌──────────────┐   ┌───────────────┐                  │
//! │  │ HostConfig   │──▶│ TcpTransport  │──── TCP ───▶ MPM │
//! │  │ (serde)      │   │ (socket2)     │                  │
//! │  └──────┬───────┘   └───────┬───────┘                  │
//! │         │                   │ RpcTransport             │
//! │         ▼                   ▼                          │
//! │  ┌──────────────────────────────────────────────────┐  │
//! │  │  rhodium_core::FrontendController                │  │
//! │  │  - PropertyTree nodes for every channel          │  │
//! │  │  - RegisterBus supplied by the caller            │  │
//! │  └──────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example: Bringing Up a Board
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rhodium::{open_frontend, HostConfig};
//! use rhodium_core::{PropertyTree, RegisterBus};
//!
//! fn bring_up(bus: Arc<dyn RegisterBus>) -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HostConfig::from_json(r#"{"transport": {"address": "192.168.10.2:49601"}}"#)?;
//!     let tree = PropertyTree::new();
//!     let ctrl = open_frontend(&config, "session-token", tree.clone(), bus)?;
//!
//!     tree.access::<f64>(ctrl.fe_path(rhodium_core::Direction::Rx, 0).join("freq/value"))?
//!         .set(2.4e9)?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use rhodium_core::{FrontendController, PropertyTree, RegisterBus, RpcClient, RpcError, TreeError};

pub mod config;
pub mod transport;
pub mod wire;

pub use config::{HostConfig, TransportConfig};
pub use transport::TcpTransport;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Open the peripheral manager connection and wrap it in a client
pub fn connect(config: &TransportConfig, token: &str) -> Result<RpcClient, RpcError> {
    let transport = TcpTransport::connect(config)?;
    Ok(RpcClient::new(Arc::new(transport), token))
}

/// Connect, then run every frontend initialization step against `tree`
pub fn open_frontend(
    config: &HostConfig,
    token: &str,
    tree: PropertyTree,
    bus: Arc<dyn RegisterBus>,
) -> Result<Arc<FrontendController>, TreeError> {
    let rpc = connect(&config.transport, token)?;
    log::info!(
        "Rhodium {} in slot {} via {}",
        VERSION,
        config.frontend.radio_slot,
        config.transport.address
    );
    FrontendController::make(config.frontend.clone(), tree, rpc, bus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Response;
    use rhodium_core::emulator::{EmulatedBus, EmulatedMpm};
    use rhodium_core::{Direction, RpcTransport, SensorValue};
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    const TOKEN: &str = "tok";

    /// Serve `mpm` over the line protocol on a local port
    fn serve(mpm: Arc<EmulatedMpm>) -> TransportConfig {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let mpm = mpm.clone();
                thread::spawn(move || handle(stream, &mpm));
            }
        });
        TransportConfig {
            address: address.to_string(),
            ..TransportConfig::default()
        }
    }

    fn handle(stream: TcpStream, mpm: &EmulatedMpm) {
        let mut writer = stream.try_clone().unwrap();
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else { return };
            let request = wire::decode_request(&line).unwrap();
            let response = match mpm.call(&request.method, request.params) {
                Ok(result) => Response::ok(request.id, result),
                Err(e) => Response::err(request.id, e.to_string()),
            };
            let out = wire::encode_line(&response).unwrap();
            if writer.write_all(out.as_bytes()).is_err() {
                return;
            }
        }
    }

    #[test]
    fn test_frontend_over_tcp() {
        let mpm = Arc::new(EmulatedMpm::new("db_0_", TOKEN));
        mpm.set_sensor(
            Direction::Rx,
            SensorValue::boolean("lowband_lo_locked", true, "locked", "unlocked"),
        );
        let config = HostConfig {
            transport: serve(mpm.clone()),
            ..HostConfig::default()
        };

        let tree = PropertyTree::new();
        let ctrl = open_frontend(&config, TOKEN, tree.clone(), Arc::new(EmulatedBus::new())).unwrap();

        let sensor = tree
            .access::<SensorValue>(ctrl.fe_path(Direction::Rx, 0).join("sensors/lowband_lo_locked"))
            .unwrap();
        assert_eq!(sensor.get().unwrap().to_bool(), Some(true));
        assert_eq!(mpm.call_count("get_sensor"), 1);

        let freq = tree
            .access::<f64>(ctrl.fe_path(Direction::Rx, 0).join("freq/value"))
            .unwrap();
        freq.set(1e9).unwrap();
        assert!((freq.get().unwrap() - 1e9).abs() < 10.0);
    }

    #[test]
    fn test_stale_token_fails_bring_up() {
        let mpm = Arc::new(EmulatedMpm::new("db_0_", TOKEN));
        let config = HostConfig {
            transport: serve(mpm),
            ..HostConfig::default()
        };
        let res = open_frontend(&config, "stale", PropertyTree::new(), Arc::new(EmulatedBus::new()));
        assert!(matches!(res, Err(TreeError::Rpc(RpcError::Remote(_)))));
    }
}

//! # Rhodium Core
//!
//! Platform-independent control plane for the Rhodium RF daughterboard.
//!
//! This crate keeps a live, typed model of the analog frontend (frequency,
//! gain, antenna, bandwidth, LO staging and sensors) in a reactive
//! [`PropertyTree`]. Tree writes are routed through coercers that program
//! the hardware and return the value actually in effect; tree reads of live
//! state go through publishers.
//!
//! No sockets are opened here. Local peripherals are reached through the
//! [`RegisterBus`] trait and the remote peripheral manager through the
//! [`RpcTransport`] trait, both injected by the host.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  rhodium-core (no sockets, no async)                        │
//! │  ├── tree/      (typed nodes, coercers, publishers)         │
//! │  ├── frontend/  (per-channel wiring, tuning, sensors)       │
//! │  ├── hw/        (SPI, CPLD, LO synthesizers, GPIO, cores)   │
//! │  ├── rpc        (token-carrying RPC client)                 │
//! │  ├── RegisterBus  (abstracts the control bus)               │
//! │  └── RpcTransport (abstracts the RPC channel)               │
//! └──────────────────────────────────────────────────────────────┘
//!                 ▲                           ▲
//!    ┌────────────┴────────────┐   ┌──────────┴──────────┐
//!    │  rhodium                │   │  emulator           │
//!    │  (TcpTransport)         │   │  (EmulatedBus/Mpm)  │
//!    └─────────────────────────┘   └─────────────────────┘
//! ```
//!
//! ## Key Modules
//!
//! - [`tree`] - Property tree engine and path type
//! - [`frontend`] - Frontend controller and board constants
//! - [`hw`] - Control bus peripheral drivers
//! - [`rpc`] - Peripheral manager client ([`RpcClient`])
//! - [`types`] - Direction, LO stage, ranges and sensor values
//!
//! ## Feature Flags
//!
//! - `emulator` - In-memory control bus and peripheral manager
//!
//! ## Example: Reactive Nodes
//!
//! ```rust
//! use rhodium_core::{PropertyTree, TreeError};
//!
//! let tree = PropertyTree::new();
//! tree.create::<f64>("gain/value")?
//!     .set_coercer(|g| Ok(g.clamp(0.0, 60.0)));
//!
//! let gain = tree.access::<f64>("gain/value")?;
//! gain.set(75.0)?;
//! assert_eq!(gain.get()?, 60.0);
//!
//! // Subtrees alias the same nodes
//! let view = tree.subtree("gain");
//! assert_eq!(view.access::<f64>("value")?.get()?, 60.0);
//! # Ok::<(), TreeError>(())
//! ```

pub mod config;
pub mod error;
pub mod frontend;
pub mod hw;
pub mod rpc;
pub mod tree;
pub mod types;

#[cfg(any(test, feature = "emulator"))]
pub mod emulator;

// Re-export commonly used types
pub use config::FrontendConfig;
pub use error::TreeError;
pub use frontend::FrontendController;
pub use hw::{HardwareError, RegisterBus};
pub use rpc::{RpcClient, RpcError, RpcTransport};
pub use tree::{Property, PropertyPath, PropertyTree};
pub use types::{Direction, LoSource, LoStage, MetaRange, Range, SensorType, SensorValue};

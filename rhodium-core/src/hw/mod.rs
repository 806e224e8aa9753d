//! Local peripherals reachable over the radio's control bus.
//!
//! Everything in this module sits on top of one injected trait,
//! [`RegisterBus`], which moves 32-bit words to and from the settings and
//! readback register spaces of the radio block. The SPI core, GPIO bank and
//! analog correction cores are plain register users; the CPLD and the LO
//! synthesizers are SPI slaves driven through write/read function pairs.
//!
//! ```text
//!   RegisterBus (injected)
//!     ├── SpiCore ── spi_writer/spi_reader ──┬── Cpld
//!     │                                      ├── Synthesizer (TX LO)
//!     │                                      └── Synthesizer (RX LO)
//!     ├── GpioAtr
//!     ├── RxFrontendCore
//!     └── TxFrontendCore
//! ```

use thiserror::Error;

pub mod cpld;
pub mod fe_core;
pub mod gpio;
pub mod spi;
pub mod synth;

pub use cpld::{Band, Cpld};
pub use fe_core::{RxFrontendCore, TxFrontendCore};
pub use gpio::{AtrMode, GpioAtr, GpioPins, PinDirection};
pub use spi::{spi_reader, spi_writer, ReadFn, SlaveSelect, SpiConfig, SpiCore, SpiEdge, SpiIface, WriteFn};
pub use synth::{MashOrder, Synthesizer};

// =============================================================================
// Error Types
// =============================================================================

/// Failures while programming local peripherals
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HardwareError {
    /// Control bus transaction failed
    #[error("Control bus error: {0}")]
    Bus(String),

    /// Peripheral used before it was constructed
    #[error("Peripheral not initialized: {0}")]
    NotInitialized(String),

    /// Request the hardware cannot carry out
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

// =============================================================================
// Control bus
// =============================================================================

/// 32-bit register access to one radio block
pub trait RegisterBus: Send + Sync {
    /// Write `data` to settings register `addr`
    fn poke32(&self, addr: u32, data: u32) -> Result<(), HardwareError>;

    /// Read readback register `addr`
    fn peek32(&self, addr: u32) -> Result<u32, HardwareError>;
}

/// Register address map of the radio block
pub mod regs {
    pub const SPI: u32 = 168;
    pub const GPIO: u32 = 184;
    pub const RB_SPI: u32 = 3;
    pub const RB_DB_GPIO: u32 = 4;

    /// Base of the TX analog correction block
    pub const TX_FE_BASE: u32 = 224;
    /// Base of the RX analog correction block
    pub const RX_FE_BASE: u32 = 232;

    /// Byte address of a 32-bit settings register
    pub const fn sr_addr(offset: u32) -> u32 {
        offset * 4
    }

    /// Byte address of a 64-bit readback register
    pub const fn rb_addr(offset: u32) -> u32 {
        offset * 8
    }
}

#[cfg(test)]
mod tests {
    use super::regs;

    #[test]
    fn test_register_addresses() {
        assert_eq!(regs::sr_addr(regs::SPI), 672);
        assert_eq!(regs::sr_addr(regs::RX_FE_BASE), 928);
        assert_eq!(regs::rb_addr(regs::RB_SPI), 24);
    }
}

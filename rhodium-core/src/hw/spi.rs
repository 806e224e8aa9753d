//! SPI transaction issuer on the control bus

use std::sync::{Arc, Mutex, PoisonError};

use super::{regs, HardwareError, RegisterBus};

/// Width of every transaction the board peripherals expect
pub const TRANSACTION_BITS: u8 = 24;

/// Clock edge on which a data line is sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiEdge {
    Rise,
    Fall,
}

impl SpiEdge {
    const fn bit(self) -> u32 {
        match self {
            SpiEdge::Rise => 0,
            SpiEdge::Fall => 1,
        }
    }
}

/// Bus settings for one slave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiConfig {
    pub use_custom_divider: bool,
    pub divider: u16,
    pub mosi_edge: SpiEdge,
    pub miso_edge: SpiEdge,
}

impl SpiConfig {
    const BOARD: SpiConfig = SpiConfig {
        use_custom_divider: true,
        divider: 10,
        mosi_edge: SpiEdge::Rise,
        miso_edge: SpiEdge::Fall,
    };

    pub const fn cpld() -> Self {
        Self::BOARD
    }

    pub const fn tx_lo() -> Self {
        Self::BOARD
    }

    pub const fn rx_lo() -> Self {
        Self::BOARD
    }

    fn effective_divider(&self) -> u32 {
        if self.use_custom_divider {
            self.divider as u32
        } else {
            DEFAULT_DIVIDER
        }
    }
}

const DEFAULT_DIVIDER: u32 = 30;

/// Chip select lines on the daughterboard SPI bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlaveSelect {
    Cpld = 8,
    TxLo = 1,
    RxLo = 2,
}

impl SlaveSelect {
    pub const fn mask(self) -> u32 {
        self as u32
    }
}

/// Issues SPI transactions
pub trait SpiIface: Send + Sync {
    fn write_spi(
        &self,
        slave: SlaveSelect,
        config: &SpiConfig,
        word: u32,
        num_bits: u8,
    ) -> Result<(), HardwareError>;

    fn read_spi(
        &self,
        slave: SlaveSelect,
        config: &SpiConfig,
        word: u32,
        num_bits: u8,
    ) -> Result<u32, HardwareError>;
}

/// One-word write bound to a slave and config
pub type WriteFn = Arc<dyn Fn(u32) -> Result<(), HardwareError> + Send + Sync>;

/// One-word transfer returning the readback, bound to a slave and config
pub type ReadFn = Arc<dyn Fn(u32) -> Result<u32, HardwareError> + Send + Sync>;

// Settings register offsets relative to the SPI base
const OFFSET_DIVIDER: u32 = 0;
const OFFSET_CTRL: u32 = 1;
const OFFSET_DATA: u32 = 2;

#[derive(Default)]
struct Shadow {
    divider: Option<u32>,
    ctrl: Option<u32>,
}

/// SPI engine of the radio block.
///
/// Transactions are serialised internally; divider and control words are
/// only rewritten when they change.
pub struct SpiCore {
    bus: Arc<dyn RegisterBus>,
    base: u32,
    readback: u32,
    shadow: Mutex<Shadow>,
}

impl SpiCore {
    pub fn new(bus: Arc<dyn RegisterBus>, base: u32, readback: u32) -> Self {
        SpiCore {
            bus,
            base,
            readback,
            shadow: Mutex::new(Shadow::default()),
        }
    }

    /// Core at the standard radio block addresses
    pub fn with_default_regs(bus: Arc<dyn RegisterBus>) -> Self {
        Self::new(bus, regs::sr_addr(regs::SPI), regs::rb_addr(regs::RB_SPI))
    }

    fn transact(
        &self,
        slave: SlaveSelect,
        config: &SpiConfig,
        word: u32,
        num_bits: u8,
        readback: bool,
    ) -> Result<u32, HardwareError> {
        if num_bits == 0 || num_bits > 32 {
            return Err(HardwareError::Unsupported(format!(
                "SPI transfer of {} bits",
                num_bits
            )));
        }

        let mut shadow = self.shadow.lock().unwrap_or_else(PoisonError::into_inner);

        let divider = config.effective_divider();
        if shadow.divider != Some(divider) {
            self.bus.poke32(self.base + OFFSET_DIVIDER * 4, divider)?;
            shadow.divider = Some(divider);
        }

        let ctrl = slave.mask()
            | (u32::from(num_bits) & 0x3f) << 24
            | config.mosi_edge.bit() << 30
            | config.miso_edge.bit() << 31;
        if shadow.ctrl != Some(ctrl) {
            self.bus.poke32(self.base + OFFSET_CTRL * 4, ctrl)?;
            shadow.ctrl = Some(ctrl);
        }

        // data is shifted out MSB first from the top of the register
        let data = if num_bits == 32 { word } else { word << (32 - num_bits) };
        self.bus.poke32(self.base + OFFSET_DATA * 4, data)?;

        if !readback {
            return Ok(0);
        }
        let mask = if num_bits == 32 {
            u32::MAX
        } else {
            (1u32 << num_bits) - 1
        };
        Ok(self.bus.peek32(self.readback)? & mask)
    }
}

impl SpiIface for SpiCore {
    fn write_spi(
        &self,
        slave: SlaveSelect,
        config: &SpiConfig,
        word: u32,
        num_bits: u8,
    ) -> Result<(), HardwareError> {
        self.transact(slave, config, word, num_bits, false).map(|_| ())
    }

    fn read_spi(
        &self,
        slave: SlaveSelect,
        config: &SpiConfig,
        word: u32,
        num_bits: u8,
    ) -> Result<u32, HardwareError> {
        self.transact(slave, config, word, num_bits, true)
    }
}

/// Bind a 24-bit write to `slave`
pub fn spi_writer(spi: Arc<dyn SpiIface>, slave: SlaveSelect, config: SpiConfig) -> WriteFn {
    Arc::new(move |word| spi.write_spi(slave, &config, word, TRANSACTION_BITS))
}

/// Bind a 24-bit read to `slave`
pub fn spi_reader(spi: Arc<dyn SpiIface>, slave: SlaveSelect, config: SpiConfig) -> ReadFn {
    Arc::new(move |word| spi.read_spi(slave, &config, word, TRANSACTION_BITS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::EmulatedBus;

    #[test]
    fn test_write_programs_divider_ctrl_and_data() {
        let bus = Arc::new(EmulatedBus::new());
        let core = SpiCore::with_default_regs(bus.clone());
        core.write_spi(SlaveSelect::Cpld, &SpiConfig::cpld(), 0x12_3456, 24)
            .unwrap();

        let base = regs::sr_addr(regs::SPI);
        let pokes = bus.pokes();
        assert_eq!(pokes.len(), 3);
        assert_eq!(pokes[0], (base, 10));
        assert_eq!(pokes[1].1 & 0xff_ffff, SlaveSelect::Cpld.mask());
        assert_eq!((pokes[1].1 >> 24) & 0x3f, 24);
        assert_eq!(pokes[1].1 >> 31, 1);
        assert_eq!(pokes[2], (base + 8, 0x12_3456 << 8));
    }

    #[test]
    fn test_unchanged_settings_are_not_rewritten() {
        let bus = Arc::new(EmulatedBus::new());
        let core = SpiCore::with_default_regs(bus.clone());
        let cfg = SpiConfig::tx_lo();
        core.write_spi(SlaveSelect::TxLo, &cfg, 1, 24).unwrap();
        core.write_spi(SlaveSelect::TxLo, &cfg, 2, 24).unwrap();
        assert_eq!(bus.pokes().len(), 4);

        core.write_spi(SlaveSelect::RxLo, &cfg, 3, 24).unwrap();
        assert_eq!(bus.pokes().len(), 6);
    }

    #[test]
    fn test_read_masks_to_width() {
        let bus = Arc::new(EmulatedBus::new());
        bus.set_readback(regs::rb_addr(regs::RB_SPI), 0xdead_beef);
        let spi: Arc<dyn SpiIface> = Arc::new(SpiCore::with_default_regs(bus));
        let read = spi_reader(spi, SlaveSelect::RxLo, SpiConfig::rx_lo());
        assert_eq!(read(0x80_0000).unwrap(), 0xad_beef);
    }

    #[test]
    fn test_bad_width_rejected() {
        let bus = Arc::new(EmulatedBus::new());
        let core = SpiCore::with_default_regs(bus);
        let res = core.write_spi(SlaveSelect::Cpld, &SpiConfig::cpld(), 0, 40);
        assert!(matches!(res, Err(HardwareError::Unsupported(_))));
    }
}

//! Daughterboard CPLD: attenuators, RF switches and LO routing
//!
//! The CPLD owns every control line on the board that is not part of an LO
//! synthesizer. Registers are 16 bits wide; the driver keeps a shadow copy
//! of each so single fields can be changed without a read-modify-write on
//! the bus.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::spi::{ReadFn, WriteFn};
use super::HardwareError;
use crate::types::{Direction, LoSource, LoStage};

/// CPLD register addresses
mod reg {
    pub const SIGNATURE: u8 = 0x00;
    pub const STATUS: u8 = 0x01;
    pub const RF_GAIN_TX: u8 = 0x20;
    pub const RF_GAIN_RX: u8 = 0x21;
    pub const LO_GAIN_TX: u8 = 0x22;
    pub const LO_GAIN_RX: u8 = 0x23;
    pub const LO2_POWER: u8 = 0x24;
    pub const RF_SWITCH_TX: u8 = 0x30;
    pub const RF_SWITCH_RX: u8 = 0x31;
    pub const LO_CTRL: u8 = 0x32;
}

const READ_FLAG: u32 = 1 << 23;
const STATUS_LO2_LOCKED: u16 = 1 << 0;

/// A bit field within one register
#[derive(Debug, Clone, Copy)]
struct Field {
    reg: u8,
    shift: u8,
    width: u8,
}

impl Field {
    const fn new(reg: u8, shift: u8, width: u8) -> Self {
        Field { reg, shift, width }
    }

    fn mask(&self) -> u16 {
        (((1u32 << self.width) - 1) << self.shift) as u16
    }

    fn apply(&self, current: u16, value: u16) -> u16 {
        (current & !self.mask()) | ((value << self.shift) & self.mask())
    }

    fn max(&self) -> u16 {
        ((1u32 << self.width) - 1) as u16
    }
}

/// Which half of the RF chain a signal passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// Mixed down through the fixed LO2
    Lowband,
    /// Tuned by LO1 directly
    Highband,
}

fn rf_gain(dir: Direction) -> Field {
    match dir {
        Direction::Tx => Field::new(reg::RF_GAIN_TX, 0, 6),
        Direction::Rx => Field::new(reg::RF_GAIN_RX, 0, 6),
    }
}

fn lo_gain(dir: Direction, stage: LoStage) -> Field {
    let reg = match dir {
        Direction::Tx => reg::LO_GAIN_TX,
        Direction::Rx => reg::LO_GAIN_RX,
    };
    match stage {
        LoStage::Lo1 => Field::new(reg, 0, 5),
        LoStage::Lo2 => Field::new(reg, 5, 5),
    }
}

fn lo2_power(dir: Direction) -> Field {
    match dir {
        Direction::Tx => Field::new(reg::LO2_POWER, 0, 6),
        Direction::Rx => Field::new(reg::LO2_POWER, 6, 6),
    }
}

fn rf_switch(dir: Direction) -> u8 {
    match dir {
        Direction::Tx => reg::RF_SWITCH_TX,
        Direction::Rx => reg::RF_SWITCH_RX,
    }
}

fn antenna(dir: Direction) -> Field {
    Field::new(rf_switch(dir), 0, 2)
}

fn band(dir: Direction) -> Field {
    Field::new(rf_switch(dir), 4, 1)
}

fn lo_bit(dir: Direction, stage: LoStage) -> u8 {
    (dir.index() * 2 + stage.index()) as u8
}

fn lo_export(dir: Direction, stage: LoStage) -> Field {
    Field::new(reg::LO_CTRL, lo_bit(dir, stage), 1)
}

fn lo_source(dir: Direction, stage: LoStage) -> Field {
    Field::new(reg::LO_CTRL, 4 + lo_bit(dir, stage), 1)
}

/// Driver for the board CPLD
pub struct Cpld {
    write: WriteFn,
    read: ReadFn,
    shadow: Mutex<HashMap<u8, u16>>,
}

impl Cpld {
    pub fn new(write: WriteFn, read: ReadFn) -> Self {
        Cpld {
            write,
            read,
            shadow: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u8, u16>> {
        self.shadow.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_field(&self, field: Field, value: u16) -> Result<(), HardwareError> {
        if value > field.max() {
            return Err(HardwareError::Unsupported(format!(
                "value {} does not fit CPLD register 0x{:02x}",
                value, field.reg
            )));
        }
        let mut shadow = self.lock();
        let current = shadow.get(&field.reg).copied().unwrap_or(0);
        let next = field.apply(current, value);
        (self.write)(u32::from(field.reg & 0x7f) << 16 | u32::from(next))?;
        shadow.insert(field.reg, next);
        Ok(())
    }

    fn read_field(&self, field: Field) -> u16 {
        let current = self.lock().get(&field.reg).copied().unwrap_or(0);
        (current & field.mask()) >> field.shift
    }

    fn read_reg(&self, addr: u8) -> Result<u16, HardwareError> {
        let word = (self.read)(READ_FLAG | u32::from(addr & 0x7f) << 16)?;
        Ok((word & 0xffff) as u16)
    }

    /// Read the signature register straight from the device
    pub fn signature(&self) -> Result<u16, HardwareError> {
        self.read_reg(reg::SIGNATURE)
    }

    /// Lock state of the fixed lowband LO
    pub fn lo2_locked(&self) -> Result<bool, HardwareError> {
        Ok(self.read_reg(reg::STATUS)? & STATUS_LO2_LOCKED != 0)
    }

    /// RF attenuator index, 0..=60
    pub fn set_gain_index(&self, dir: Direction, index: u8) -> Result<(), HardwareError> {
        self.write_field(rf_gain(dir), u16::from(index))
    }

    pub fn gain_index(&self, dir: Direction) -> u8 {
        self.read_field(rf_gain(dir)) as u8
    }

    /// LO attenuator index, 0..=30
    pub fn set_lo_gain(&self, dir: Direction, stage: LoStage, index: u8) -> Result<(), HardwareError> {
        self.write_field(lo_gain(dir, stage), u16::from(index))
    }

    pub fn lo_gain(&self, dir: Direction, stage: LoStage) -> u8 {
        self.read_field(lo_gain(dir, stage)) as u8
    }

    /// Output level of the fixed lowband LO
    pub fn set_lo2_power(&self, dir: Direction, power: u8) -> Result<(), HardwareError> {
        self.write_field(lo2_power(dir), u16::from(power))
    }

    pub fn lo2_power(&self, dir: Direction) -> u8 {
        self.read_field(lo2_power(dir)) as u8
    }

    pub fn set_antenna(&self, dir: Direction, switch: u8) -> Result<(), HardwareError> {
        self.write_field(antenna(dir), u16::from(switch))
    }

    pub fn antenna(&self, dir: Direction) -> u8 {
        self.read_field(antenna(dir)) as u8
    }

    pub fn set_band(&self, dir: Direction, selected: Band) -> Result<(), HardwareError> {
        let bit = match selected {
            Band::Highband => 0,
            Band::Lowband => 1,
        };
        self.write_field(band(dir), bit)
    }

    pub fn band(&self, dir: Direction) -> Band {
        if self.read_field(band(dir)) == 1 {
            Band::Lowband
        } else {
            Band::Highband
        }
    }

    pub fn set_lo_export(&self, dir: Direction, stage: LoStage, enabled: bool) -> Result<(), HardwareError> {
        self.write_field(lo_export(dir, stage), u16::from(enabled))
    }

    pub fn lo_export(&self, dir: Direction, stage: LoStage) -> bool {
        self.read_field(lo_export(dir, stage)) == 1
    }

    pub fn set_lo_source(&self, dir: Direction, stage: LoStage, source: LoSource) -> Result<(), HardwareError> {
        let bit = match source {
            LoSource::Internal => 0,
            LoSource::External => 1,
        };
        self.write_field(lo_source(dir, stage), bit)
    }

    pub fn lo_source(&self, dir: Direction, stage: LoStage) -> LoSource {
        if self.read_field(lo_source(dir, stage)) == 1 {
            LoSource::External
        } else {
            LoSource::Internal
        }
    }
}

//! Fractional-N LO synthesizer driver
//!
//! The synthesizer multiplies its reference up to a VCO frequency between
//! 3.55 and 7.1 GHz and divides the VCO down by a power of two. The feedback
//! divider is `N + NUM/DEN` with a fixed 24-bit denominator, so the achieved
//! output frequency is
//!
//! ```text
//! f_out = f_ref * (N + NUM / 2^24) / div
//! ```
//!
//! Every register write is one 24-bit SPI word: a read/write flag, a 7-bit
//! register address and 16 data bits.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::spi::{ReadFn, WriteFn};
use super::HardwareError;

/// Synthesizer register addresses
mod reg {
    pub const CONFIG: u8 = 0;
    pub const CHDIV: u8 = 35;
    pub const MASH_ORDER: u8 = 37;
    pub const PLL_N: u8 = 38;
    pub const PLL_DEN_MSB: u8 = 40;
    pub const PLL_DEN_LSB: u8 = 41;
    pub const PLL_NUM_MSB: u8 = 44;
    pub const PLL_NUM_LSB: u8 = 45;
    pub const OUT_POWER: u8 = 46;
    pub const LOCK_DETECT: u8 = 70;
}

const READ_FLAG: u32 = 1 << 23;
const CONFIG_FCAL_EN: u16 = 1 << 3;
const LOCK_DETECT_BIT: u32 = 1 << 9;

pub const VCO_MIN: f64 = 3.55e9;
pub const VCO_MAX: f64 = 7.1e9;
const MAX_OUTPUT_DIVIDER: u32 = 64;
const DENOMINATOR: u32 = 1 << 24;
pub const MAX_OUTPUT_POWER: u8 = 63;

/// Sigma-delta modulator order of the fractional divider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MashOrder {
    /// Fractional path disabled
    Integer,
    First,
    Second,
    #[default]
    Third,
    Fourth,
}

impl MashOrder {
    const fn as_reg(self) -> u16 {
        match self {
            MashOrder::Integer => 0,
            MashOrder::First => 1,
            MashOrder::Second => 2,
            MashOrder::Third => 3,
            MashOrder::Fourth => 4,
        }
    }
}

/// Divider settings for one output frequency
#[derive(Debug, Clone, Copy, PartialEq)]
struct PllParams {
    n: u16,
    num: u32,
    divider: u32,
}

impl PllParams {
    fn output(&self, reference: f64) -> f64 {
        reference * (self.n as f64 + self.num as f64 / DENOMINATOR as f64) / self.divider as f64
    }
}

struct SynthState {
    reference: Option<f64>,
    mash: MashOrder,
    frequency: Option<f64>,
    output_power: u8,
}

/// One LO synthesizer on the SPI bus
pub struct Synthesizer {
    write: WriteFn,
    read: ReadFn,
    state: Mutex<SynthState>,
}

impl Synthesizer {
    pub fn new(write: WriteFn, read: ReadFn) -> Self {
        Synthesizer {
            write,
            read,
            state: Mutex::new(SynthState {
                reference: None,
                mash: MashOrder::default(),
                frequency: None,
                output_power: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SynthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_reg(&self, addr: u8, value: u16) -> Result<(), HardwareError> {
        (self.write)((u32::from(addr) & 0x7f) << 16 | u32::from(value))
    }

    fn read_reg(&self, addr: u8) -> Result<u16, HardwareError> {
        let word = (self.read)(READ_FLAG | (u32::from(addr) & 0x7f) << 16)?;
        Ok((word & 0xffff) as u16)
    }

    pub fn set_reference_frequency(&self, reference: f64) -> Result<(), HardwareError> {
        if reference.is_nan() || reference <= 0.0 {
            return Err(HardwareError::Unsupported(format!(
                "reference frequency {}",
                reference
            )));
        }
        self.lock().reference = Some(reference);
        Ok(())
    }

    pub fn reference_frequency(&self) -> Option<f64> {
        self.lock().reference
    }

    pub fn set_mash_order(&self, order: MashOrder) -> Result<(), HardwareError> {
        self.write_reg(reg::MASH_ORDER, order.as_reg())?;
        self.lock().mash = order;
        Ok(())
    }

    pub fn mash_order(&self) -> MashOrder {
        self.lock().mash
    }

    /// Output frequency range reachable through the output divider
    pub fn output_range() -> (f64, f64) {
        (VCO_MIN / MAX_OUTPUT_DIVIDER as f64, VCO_MAX)
    }

    fn compute(reference: f64, target: f64, mash: MashOrder) -> Result<PllParams, HardwareError> {
        let (min, max) = Self::output_range();
        if !(min..=max).contains(&target) {
            return Err(HardwareError::Unsupported(format!(
                "LO frequency {} Hz outside {}..{} Hz",
                target, min, max
            )));
        }

        let mut divider = 1;
        while target * (divider as f64) < VCO_MIN && divider < MAX_OUTPUT_DIVIDER {
            divider *= 2;
        }

        let ratio = target * divider as f64 / reference;
        let (n, num) = if mash == MashOrder::Integer {
            (ratio.round(), 0)
        } else {
            let n = ratio.floor();
            let num = ((ratio - n) * DENOMINATOR as f64).round() as u32;
            if num >= DENOMINATOR {
                (n + 1.0, 0)
            } else {
                (n, num)
            }
        };
        if n < 1.0 || n > u16::MAX as f64 {
            return Err(HardwareError::Unsupported(format!(
                "feedback divider {} out of range",
                n
            )));
        }
        Ok(PllParams {
            n: n as u16,
            num,
            divider,
        })
    }

    /// Tune to `target` and return the frequency actually produced
    pub fn set_frequency(&self, target: f64) -> Result<f64, HardwareError> {
        let mut state = self.lock();
        let reference = state
            .reference
            .ok_or_else(|| HardwareError::NotInitialized("LO reference frequency".to_string()))?;
        let params = Self::compute(reference, target, state.mash)?;

        self.write_reg(reg::CHDIV, params.divider.trailing_zeros() as u16)?;
        self.write_reg(reg::PLL_N, params.n)?;
        self.write_reg(reg::PLL_DEN_MSB, (DENOMINATOR >> 16) as u16)?;
        self.write_reg(reg::PLL_DEN_LSB, (DENOMINATOR & 0xffff) as u16)?;
        self.write_reg(reg::PLL_NUM_MSB, (params.num >> 16) as u16)?;
        self.write_reg(reg::PLL_NUM_LSB, (params.num & 0xffff) as u16)?;
        // retrigger VCO calibration so the new divider takes effect
        self.write_reg(reg::CONFIG, CONFIG_FCAL_EN)?;

        let actual = params.output(reference);
        log::trace!(
            "LO tuned to {} Hz (requested {}): N={} NUM={} div={}",
            actual,
            target,
            params.n,
            params.num,
            params.divider
        );
        state.frequency = Some(actual);
        Ok(actual)
    }

    /// Last programmed output frequency
    pub fn frequency(&self) -> Option<f64> {
        self.lock().frequency
    }

    /// Set output power; values above the maximum are clamped
    pub fn set_output_power(&self, power: u8) -> Result<u8, HardwareError> {
        let power = power.min(MAX_OUTPUT_POWER);
        self.write_reg(reg::OUT_POWER, u16::from(power) << 8)?;
        self.lock().output_power = power;
        Ok(power)
    }

    pub fn output_power(&self) -> u8 {
        self.lock().output_power
    }

    /// True when the PLL reports lock
    pub fn lock_status(&self) -> Result<bool, HardwareError> {
        if self.lock().frequency.is_none() {
            return Ok(false);
        }
        let detect = self.read_reg(reg::LOCK_DETECT)?;
        Ok(u32::from(detect) & LOCK_DETECT_BIT != 0)
    }
}

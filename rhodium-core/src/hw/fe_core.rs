//! Digital correction blocks in front of the converters
//!
//! Both cores take complex corrections in the range [-1, 1) per component
//! and quantise them to signed fixed point. Setters return the value the
//! hardware actually holds after quantisation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use num_complex::Complex64;

use super::{regs, HardwareError, RegisterBus};
use crate::error::TreeError;
use crate::tree::PropertyTree;

pub const DEFAULT_DC_OFFSET_VALUE: Complex64 = Complex64::new(0.0, 0.0);
pub const DEFAULT_DC_OFFSET_ENABLE: bool = true;
pub const DEFAULT_IQ_BALANCE_VALUE: Complex64 = Complex64::new(0.0, 0.0);

// Settings register offsets relative to the core base
const OFFSET_DC_I: u32 = 0;
const OFFSET_DC_Q: u32 = 1;
const OFFSET_MAG: u32 = 2;
const OFFSET_PHASE: u32 = 3;

/// Load the offset registers
const DC_OFFSET_SET: u32 = 1 << 30;
/// Hold the loaded offset instead of tracking it
const DC_OFFSET_FIXED: u32 = 1 << 31;

const DC_OFFSET_BITS: u32 = 24;
const IQ_BALANCE_BITS: u32 = 18;

/// Quantise `value` to a `bits`-wide two's complement fraction.
/// Returns the register field and the value it represents.
fn to_fixed(value: f64, bits: u32) -> (u32, f64) {
    let scale = (1i64 << (bits - 1)) as f64;
    let raw = (value * scale).round().clamp(-scale, scale - 1.0) as i64;
    let field = (raw as u32) & ((1u32 << bits) - 1);
    (field, raw as f64 / scale)
}

fn quantise(
    bus: &dyn RegisterBus,
    base: u32,
    value: Complex64,
    bits: u32,
    offsets: (u32, u32),
    flags: u32,
) -> Result<Complex64, HardwareError> {
    let (i_field, re) = to_fixed(value.re, bits);
    let (q_field, im) = to_fixed(value.im, bits);
    bus.poke32(regs::sr_addr(base + offsets.0), flags | i_field)?;
    bus.poke32(regs::sr_addr(base + offsets.1), flags | q_field)?;
    Ok(Complex64::new(re, im))
}

struct RxState {
    adc_rate: Option<f64>,
    dc_offset: Complex64,
    dc_offset_auto: bool,
    iq_balance: Complex64,
}

/// Receive side correction core
pub struct RxFrontendCore {
    bus: Arc<dyn RegisterBus>,
    base: u32,
    state: Mutex<RxState>,
}

impl RxFrontendCore {
    pub fn new(bus: Arc<dyn RegisterBus>, base: u32) -> Self {
        RxFrontendCore {
            bus,
            base,
            state: Mutex::new(RxState {
                adc_rate: None,
                dc_offset: DEFAULT_DC_OFFSET_VALUE,
                dc_offset_auto: DEFAULT_DC_OFFSET_ENABLE,
                iq_balance: DEFAULT_IQ_BALANCE_VALUE,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_adc_rate(&self, rate: f64) {
        self.lock().adc_rate = Some(rate);
    }

    pub fn adc_rate(&self) -> Option<f64> {
        self.lock().adc_rate
    }

    /// Load a fixed DC offset; disables automatic tracking
    pub fn set_dc_offset(&self, offset: Complex64) -> Result<Complex64, HardwareError> {
        let mut state = self.lock();
        let actual = quantise(
            self.bus.as_ref(),
            self.base,
            offset,
            DC_OFFSET_BITS,
            (OFFSET_DC_I, OFFSET_DC_Q),
            DC_OFFSET_SET | DC_OFFSET_FIXED,
        )?;
        state.dc_offset = actual;
        state.dc_offset_auto = false;
        Ok(actual)
    }

    pub fn set_dc_offset_auto(&self, enable: bool) -> Result<(), HardwareError> {
        let mut state = self.lock();
        let flags = if enable {
            DC_OFFSET_SET
        } else {
            DC_OFFSET_SET | DC_OFFSET_FIXED
        };
        quantise(
            self.bus.as_ref(),
            self.base,
            state.dc_offset,
            DC_OFFSET_BITS,
            (OFFSET_DC_I, OFFSET_DC_Q),
            flags,
        )?;
        state.dc_offset_auto = enable;
        Ok(())
    }

    pub fn dc_offset_auto(&self) -> bool {
        self.lock().dc_offset_auto
    }

    pub fn dc_offset(&self) -> Complex64 {
        self.lock().dc_offset
    }

    pub fn iq_balance(&self) -> Complex64 {
        self.lock().iq_balance
    }

    pub fn set_iq_balance(&self, correction: Complex64) -> Result<Complex64, HardwareError> {
        let mut state = self.lock();
        let actual = quantise(
            self.bus.as_ref(),
            self.base,
            correction,
            IQ_BALANCE_BITS,
            (OFFSET_MAG, OFFSET_PHASE),
            0,
        )?;
        state.iq_balance = actual;
        Ok(actual)
    }

    /// Expose the corrections as `dc_offset/{enable,value}` and
    /// `iq_balance/value` under `subtree`
    pub fn populate_subtree(self: &Arc<Self>, subtree: &PropertyTree) -> Result<(), TreeError> {
        let core = Arc::clone(self);
        subtree
            .create::<bool>("dc_offset/enable")?
            .set(DEFAULT_DC_OFFSET_ENABLE)?
            .add_subscriber(move |enable| Ok(core.set_dc_offset_auto(*enable)?));

        let core = Arc::clone(self);
        subtree
            .create::<Complex64>("dc_offset/value")?
            .set(DEFAULT_DC_OFFSET_VALUE)?
            .set_coercer(move |offset| Ok(core.set_dc_offset(offset)?));

        let core = Arc::clone(self);
        subtree
            .create::<Complex64>("iq_balance/value")?
            .set(DEFAULT_IQ_BALANCE_VALUE)?
            .set_coercer(move |correction| Ok(core.set_iq_balance(correction)?));
        Ok(())
    }
}

/// Transmit side correction core
pub struct TxFrontendCore {
    bus: Arc<dyn RegisterBus>,
    base: u32,
    state: Mutex<(Complex64, Complex64)>,
}

impl TxFrontendCore {
    pub fn new(bus: Arc<dyn RegisterBus>, base: u32) -> Self {
        TxFrontendCore {
            bus,
            base,
            state: Mutex::new((DEFAULT_DC_OFFSET_VALUE, DEFAULT_IQ_BALANCE_VALUE)),
        }
    }

    pub fn set_dc_offset(&self, offset: Complex64) -> Result<Complex64, HardwareError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let actual = quantise(
            self.bus.as_ref(),
            self.base,
            offset,
            DC_OFFSET_BITS,
            (OFFSET_DC_I, OFFSET_DC_Q),
            0,
        )?;
        state.0 = actual;
        Ok(actual)
    }

    pub fn set_iq_balance(&self, correction: Complex64) -> Result<Complex64, HardwareError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let actual = quantise(
            self.bus.as_ref(),
            self.base,
            correction,
            IQ_BALANCE_BITS,
            (OFFSET_MAG, OFFSET_PHASE),
            0,
        )?;
        state.1 = actual;
        Ok(actual)
    }

    pub fn dc_offset(&self) -> Complex64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).0
    }

    pub fn iq_balance(&self) -> Complex64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).1
    }

    pub fn populate_subtree(self: &Arc<Self>, subtree: &PropertyTree) -> Result<(), TreeError> {
        let core = Arc::clone(self);
        subtree
            .create::<Complex64>("dc_offset/value")?
            .set(DEFAULT_DC_OFFSET_VALUE)?
            .set_coercer(move |offset| Ok(core.set_dc_offset(offset)?));

        let core = Arc::clone(self);
        subtree
            .create::<Complex64>("iq_balance/value")?
            .set(DEFAULT_IQ_BALANCE_VALUE)?
            .set_coercer(move |correction| Ok(core.set_iq_balance(correction)?));
        Ok(())
    }
}

//! Daughterboard GPIO bank with automatic transmit/receive switching

use std::sync::{Arc, Mutex, PoisonError};

use bitflags::bitflags;

use super::{regs, HardwareError, RegisterBus};

bitflags! {
    /// Pins of the daughterboard GPIO bank
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GpioPins: u32 {
        const PIN0 = 1 << 0;
        const PIN1 = 1 << 1;
        /// Control pair of RF switch 10
        const SWITCH10 = Self::PIN0.bits() | Self::PIN1.bits();
        const ALL = u32::MAX;
    }
}

/// Who drives a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtrMode {
    /// Pin follows the transmit/receive state machine
    Atr,
    /// Pin is a plain software GPIO
    Gpio,
}

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    Input,
    Output,
}

// Settings register offsets relative to the GPIO base
const OFFSET_ATR_IDLE: u32 = 0;
const OFFSET_DDR: u32 = 4;
const OFFSET_ATR_DISABLE: u32 = 5;

#[derive(Default)]
struct Shadow {
    idle: u32,
    ddr: u32,
    atr_disable: u32,
}

pub struct GpioAtr {
    bus: Arc<dyn RegisterBus>,
    base: u32,
    readback: u32,
    shadow: Mutex<Shadow>,
}

impl GpioAtr {
    pub fn new(bus: Arc<dyn RegisterBus>, base: u32, readback: u32) -> Self {
        GpioAtr {
            bus,
            base,
            readback,
            shadow: Mutex::new(Shadow::default()),
        }
    }

    pub fn with_default_regs(bus: Arc<dyn RegisterBus>) -> Self {
        Self::new(bus, regs::sr_addr(regs::GPIO), regs::rb_addr(regs::RB_DB_GPIO))
    }

    fn reg(&self, offset: u32) -> u32 {
        self.base + offset * 4
    }

    fn update(current: u32, value: u32, mask: GpioPins) -> u32 {
        (current & !mask.bits()) | (value & mask.bits())
    }

    pub fn set_atr_mode(&self, mode: AtrMode, mask: GpioPins) -> Result<(), HardwareError> {
        let mut shadow = self.shadow.lock().unwrap_or_else(PoisonError::into_inner);
        let value = match mode {
            AtrMode::Gpio => u32::MAX,
            AtrMode::Atr => 0,
        };
        let next = Self::update(shadow.atr_disable, value, mask);
        self.bus.poke32(self.reg(OFFSET_ATR_DISABLE), next)?;
        shadow.atr_disable = next;
        Ok(())
    }

    pub fn set_gpio_ddr(&self, direction: PinDirection, mask: GpioPins) -> Result<(), HardwareError> {
        let mut shadow = self.shadow.lock().unwrap_or_else(PoisonError::into_inner);
        let value = match direction {
            PinDirection::Output => u32::MAX,
            PinDirection::Input => 0,
        };
        let next = Self::update(shadow.ddr, value, mask);
        self.bus.poke32(self.reg(OFFSET_DDR), next)?;
        shadow.ddr = next;
        Ok(())
    }

    /// Drive `value` onto the pins in `mask`; other pins keep their level
    pub fn set_gpio_out(&self, value: u32, mask: GpioPins) -> Result<(), HardwareError> {
        let mut shadow = self.shadow.lock().unwrap_or_else(PoisonError::into_inner);
        let next = Self::update(shadow.idle, value, mask);
        self.bus.poke32(self.reg(OFFSET_ATR_IDLE), next)?;
        shadow.idle = next;
        Ok(())
    }

    /// Current pin levels
    pub fn read_gpio(&self) -> Result<u32, HardwareError> {
        self.bus.peek32(self.readback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::EmulatedBus;

    #[test]
    fn test_switch_setup_sequence() {
        let bus = Arc::new(EmulatedBus::new());
        let gpio = GpioAtr::with_default_regs(bus.clone());
        gpio.set_atr_mode(AtrMode::Gpio, GpioPins::ALL).unwrap();
        gpio.set_gpio_ddr(PinDirection::Output, GpioPins::ALL).unwrap();
        gpio.set_gpio_out(0x1, GpioPins::SWITCH10).unwrap();

        let base = regs::sr_addr(regs::GPIO);
        assert_eq!(bus.register(base + OFFSET_ATR_DISABLE * 4), Some(u32::MAX));
        assert_eq!(bus.register(base + OFFSET_DDR * 4), Some(u32::MAX));
        assert_eq!(bus.register(base), Some(0x1));
    }

    #[test]
    fn test_mask_preserves_other_pins() {
        let bus = Arc::new(EmulatedBus::new());
        let gpio = GpioAtr::with_default_regs(bus.clone());
        gpio.set_gpio_out(0xf0, GpioPins::from_bits_retain(0xf0)).unwrap();
        gpio.set_gpio_out(0x2, GpioPins::SWITCH10).unwrap();
        assert_eq!(bus.register(regs::sr_addr(regs::GPIO)), Some(0xf2));
    }
}

//! Per-channel setters and getters behind the frontend tree nodes
//!
//! Setters return the value actually in effect. Getters only read the
//! cached state, so they work before any peripheral exists. Everything that
//! lands in the CPLD or an LO synthesizer is shared by all channels of a
//! direction, and writing it through one channel updates them all.

use super::constants::*;
use super::FrontendController;
use crate::error::TreeError;
use crate::hw::{Band, HardwareError};
use crate::types::{Direction, LoSource, LoStage, MetaRange};

/// Convert a clipped, non-negative index to the register width
fn index(value: f64) -> u8 {
    value.round().clamp(0.0, u8::MAX as f64) as u8
}

/// NaN and infinities have no place in any range
fn finite(what: &str, value: f64) -> Result<f64, TreeError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(TreeError::InvalidValue(format!("{} must be finite, got {}", what, value)))
    }
}

impl FrontendController {
    /// Tune the channel. Below the lowband cutoff LO1 runs at `freq + LO2`
    /// and the signal is mixed down through the fixed LO2.
    pub fn set_frequency(&self, dir: Direction, freq: f64, chan: usize) -> Result<f64, TreeError> {
        self.check_channel(dir, chan)?;
        let target = freq_range().clip(finite("frequency", freq)?, true);
        let hw = self.peripherals()?;

        let (band, lo1_target) = if target < LOWBAND_CUTOFF {
            (Band::Lowband, target + LO2_FREQ)
        } else {
            (Band::Highband, target)
        };
        let lo1_actual = hw.lo(dir).set_frequency(lo1_target)?;
        hw.cpld.set_band(dir, band)?;

        let actual = match band {
            Band::Lowband => lo1_actual - LO2_FREQ,
            Band::Highband => lo1_actual,
        };
        log::debug!("{} channel {} tuned to {} Hz (requested {})", dir, chan, actual, freq);
        self.with_direction(dir, |ch| {
            ch.frequency = actual;
            ch.lo(LoStage::Lo1).frequency = lo1_actual;
        });
        Ok(actual)
    }

    pub fn frequency(&self, dir: Direction, chan: usize) -> Result<f64, TreeError> {
        self.with_channel(dir, chan, |ch| ch.frequency)
    }

    /// Clamp to the gain range and program the attenuator. A gain equal to
    /// the cached one is not written again.
    pub fn set_gain(&self, dir: Direction, gain: f64, chan: usize) -> Result<f64, TreeError> {
        let clipped = gain_range(dir).clip(finite("gain", gain)?, true);
        if self.with_channel(dir, chan, |ch| ch.gain)? == clipped {
            return Ok(clipped);
        }
        self.peripherals()?.cpld.set_gain_index(dir, index(clipped))?;
        self.with_direction(dir, |ch| ch.gain = clipped);
        Ok(clipped)
    }

    pub fn gain(&self, dir: Direction, chan: usize) -> Result<f64, TreeError> {
        self.with_channel(dir, chan, |ch| ch.gain)
    }

    /// Select an antenna. Names outside the option list are rejected.
    pub fn set_antenna(&self, dir: Direction, antenna: String, chan: usize) -> Result<String, TreeError> {
        self.check_channel(dir, chan)?;
        let position = antennas(dir)
            .iter()
            .position(|a| *a == antenna)
            .ok_or_else(|| {
                TreeError::InvalidValue(format!(
                    "invalid {} antenna '{}', options are {:?}",
                    dir,
                    antenna,
                    antennas(dir)
                ))
            })?;
        self.peripherals()?.cpld.set_antenna(dir, position as u8)?;
        self.with_direction(dir, |ch| ch.antenna = antenna.clone());
        Ok(antenna)
    }

    pub fn antenna(&self, dir: Direction, chan: usize) -> Result<String, TreeError> {
        self.with_channel(dir, chan, |ch| ch.antenna.clone())
    }

    /// The analog bandwidth is fixed; requests are clipped into it
    pub fn set_bandwidth(&self, dir: Direction, bandwidth: f64, chan: usize) -> Result<f64, TreeError> {
        let actual = bandwidth_range().clip(finite("bandwidth", bandwidth)?, false);
        if actual != bandwidth {
            log::warn!(
                "{} bandwidth {} Hz not supported, using {} Hz",
                dir,
                bandwidth,
                actual
            );
        }
        self.with_channel(dir, chan, |ch| ch.bandwidth = actual)?;
        Ok(actual)
    }

    pub fn bandwidth(&self, dir: Direction, chan: usize) -> Result<f64, TreeError> {
        self.with_channel(dir, chan, |ch| ch.bandwidth)
    }

    /// Unknown profile names fall back to the default profile
    pub fn set_gain_profile(&self, dir: Direction, profile: String) -> String {
        let actual = if GAIN_PROFILE_OPTIONS.contains(&profile.as_str()) {
            profile
        } else {
            DEFAULT_GAIN_PROFILE.to_string()
        };
        self.lock().gain_profile[dir.index()] = actual.clone();
        actual
    }

    pub fn gain_profile(&self, dir: Direction) -> String {
        self.lock().gain_profile[dir.index()].clone()
    }

    /// Only IQ sampling is supported
    pub fn set_fe_connection(&self, dir: Direction, connection: String) -> Result<String, TreeError> {
        if connection == FE_CONNECTION {
            Ok(connection)
        } else {
            Err(TreeError::InvalidValue(format!(
                "{} frontend connection '{}' not supported",
                dir, connection
            )))
        }
    }

    pub fn fe_connection(&self, _dir: Direction) -> String {
        FE_CONNECTION.to_string()
    }

    // =========================================================================
    // LO stages
    // =========================================================================

    /// LO1 is tuned directly and the channel frequency follows it through
    /// the current band; LO2 is fixed and writes are coerced to it
    pub fn set_lo_freq(&self, dir: Direction, stage: LoStage, freq: f64, chan: usize) -> Result<f64, TreeError> {
        self.check_channel(dir, chan)?;
        let freq = finite("LO frequency", freq)?;
        match stage {
            LoStage::Lo1 => {
                let target = lo_freq_range(stage).clip(freq, true);
                let hw = self.peripherals()?;
                let actual = hw.lo(dir).set_frequency(target)?;
                let channel_freq = match hw.cpld.band(dir) {
                    Band::Lowband => actual - LO2_FREQ,
                    Band::Highband => actual,
                };
                self.with_direction(dir, |ch| {
                    ch.lo(stage).frequency = actual;
                    ch.frequency = channel_freq;
                });
                Ok(actual)
            }
            LoStage::Lo2 => {
                if freq != LO2_FREQ {
                    log::warn!("{} LO2 is fixed at {} Hz, ignoring {} Hz", dir, LO2_FREQ, freq);
                }
                Ok(LO2_FREQ)
            }
        }
    }

    pub fn lo_freq(&self, dir: Direction, stage: LoStage, chan: usize) -> Result<f64, TreeError> {
        self.with_channel(dir, chan, |ch| ch.lo(stage).frequency)
    }

    pub fn lo_freq_range(&self, stage: LoStage) -> MetaRange {
        lo_freq_range(stage)
    }

    pub fn lo_sources(&self, stage: LoStage) -> Vec<String> {
        lo_sources(stage).iter().map(|s| s.to_string()).collect()
    }

    /// Route the LO stage from `source`
    pub fn set_lo_source(&self, dir: Direction, stage: LoStage, source: &str, chan: usize) -> Result<(), TreeError> {
        self.check_channel(dir, chan)?;
        let parsed = LoSource::try_from(source).map_err(TreeError::InvalidValue)?;
        if !lo_sources(stage).contains(&parsed.as_str()) {
            return Err(HardwareError::Unsupported(format!(
                "{} {} cannot use an {} source",
                dir, stage, parsed
            ))
            .into());
        }
        self.peripherals()?.cpld.set_lo_source(dir, stage, parsed)?;
        self.with_direction(dir, |ch| ch.lo(stage).source = parsed);
        Ok(())
    }

    pub fn lo_source(&self, dir: Direction, stage: LoStage, chan: usize) -> Result<String, TreeError> {
        self.with_channel(dir, chan, |ch| ch.lo(stage).source.to_string())
    }

    /// Enable or disable driving the LO out of the board
    pub fn set_lo_export(&self, dir: Direction, stage: LoStage, enabled: bool, chan: usize) -> Result<(), TreeError> {
        self.check_channel(dir, chan)?;
        self.peripherals()?.cpld.set_lo_export(dir, stage, enabled)?;
        self.with_direction(dir, |ch| ch.lo(stage).export = enabled);
        Ok(())
    }

    pub fn lo_export(&self, dir: Direction, stage: LoStage, chan: usize) -> Result<bool, TreeError> {
        self.with_channel(dir, chan, |ch| ch.lo(stage).export)
    }

    /// LO attenuator. A gain equal to the cached one is not written again.
    pub fn set_lo_gain(&self, dir: Direction, stage: LoStage, gain: f64, chan: usize) -> Result<f64, TreeError> {
        let clipped = lo_gain_range().clip(finite("LO gain", gain)?, true);
        if self.with_channel(dir, chan, |ch| ch.lo(stage).gain)? == clipped {
            return Ok(clipped);
        }
        self.peripherals()?.cpld.set_lo_gain(dir, stage, index(clipped))?;
        self.with_direction(dir, |ch| ch.lo(stage).gain = clipped);
        Ok(clipped)
    }

    pub fn lo_gain(&self, dir: Direction, stage: LoStage, chan: usize) -> Result<f64, TreeError> {
        self.with_channel(dir, chan, |ch| ch.lo(stage).gain)
    }

    /// LO output power: the synthesizer for LO1, the CPLD level for LO2
    pub fn set_lo_power(&self, dir: Direction, stage: LoStage, power: f64, chan: usize) -> Result<f64, TreeError> {
        self.check_channel(dir, chan)?;
        let clipped = lo_power_range().clip(finite("LO power", power)?, true);
        let hw = self.peripherals()?;
        let actual = match stage {
            LoStage::Lo1 => f64::from(hw.lo(dir).set_output_power(index(clipped))?),
            LoStage::Lo2 => {
                hw.cpld.set_lo2_power(dir, index(clipped))?;
                clipped
            }
        };
        self.with_direction(dir, |ch| ch.lo(stage).power = actual);
        Ok(actual)
    }

    pub fn lo_power(&self, dir: Direction, stage: LoStage, chan: usize) -> Result<f64, TreeError> {
        self.with_channel(dir, chan, |ch| ch.lo(stage).power)
    }

    /// True when every LO in use is locked. Nothing is locked before the
    /// peripherals exist.
    pub fn lo_lock_status(&self, dir: Direction) -> Result<bool, TreeError> {
        let hw = match self.peripherals() {
            Ok(hw) => hw,
            Err(_) => return Ok(false),
        };
        let lo1_locked = hw.lo(dir).lock_status()?;
        let locked = match hw.cpld.band(dir) {
            Band::Highband => lo1_locked,
            Band::Lowband => lo1_locked && hw.cpld.lo2_locked()?,
        };
        Ok(locked)
    }
}

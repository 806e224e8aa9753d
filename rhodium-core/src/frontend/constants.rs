//! Fixed board parameters

use crate::types::{Direction, LoStage, MetaRange, Range};

pub const DEFAULT_FREQ: f64 = 2.5e9;
/// Never a valid index, so the first real gain write always reaches hardware
pub const DEFAULT_INVALID_GAIN: f64 = -1.0;
pub const DEFAULT_GAIN: f64 = 0.0;
pub const DEFAULT_LO_GAIN: f64 = 30.0;
pub const DEFAULT_RX_ANTENNA: &str = "RX2";
pub const DEFAULT_TX_ANTENNA: &str = "TX/RX";
pub const DEFAULT_BANDWIDTH: f64 = 250e6;
pub const DEFAULT_GAIN_PROFILE: &str = "default";
pub const FRONTEND_NAME: &str = "Rhodium";
pub const RX_CODEC_NAME: &str = "ad9695-625";
pub const TX_CODEC_NAME: &str = "dac37j82";

pub const GAIN_PROFILE_OPTIONS: &[&str] = &[DEFAULT_GAIN_PROFILE];

/// Indexed by CPLD antenna switch position
pub const RX_ANTENNAS: &[&str] = &["TX/RX", "RX2", "CAL", "TERM"];
pub const TX_ANTENNAS: &[&str] = &[DEFAULT_TX_ANTENNA];

/// Only IQ sampling is wired on this board
pub const FE_CONNECTION: &str = "IQ";

pub const MIN_FREQ: f64 = 1e6;
pub const MAX_FREQ: f64 = 6e9;
pub const LO1_MIN_FREQ: f64 = 450e6;
pub const LO1_MAX_FREQ: f64 = 6e9;
/// Below this the signal is mixed through LO2
pub const LOWBAND_CUTOFF: f64 = 450e6;
pub const LO2_FREQ: f64 = 4.4e9;
pub const LO1_REF_FREQ: f64 = 122.88e6;

pub const MIN_GAIN: f64 = 0.0;
pub const MAX_GAIN: f64 = 60.0;
pub const GAIN_STEP: f64 = 1.0;
pub const MIN_LO_GAIN: f64 = 0.0;
pub const MAX_LO_GAIN: f64 = 30.0;
pub const MIN_LO_POWER: f64 = 0.0;
pub const MAX_LO_POWER: f64 = 63.0;

pub const LO_GAIN_NAME: &str = "gain";
pub const LO_POWER_NAME: &str = "power";
pub const LO_LOCKED_SENSOR: &str = "lo_locked";

/// Largest packet header: two 64-bit words
pub const MAX_HEADER_BYTES: usize = 2 * std::mem::size_of::<u64>();
/// One complex 16-bit sample
pub const BYTES_PER_SAMPLE: usize = 2 * std::mem::size_of::<i16>();

pub fn freq_range() -> MetaRange {
    MetaRange::new(MIN_FREQ, MAX_FREQ, 1.0)
}

pub fn gain_range(_dir: Direction) -> MetaRange {
    MetaRange::new(MIN_GAIN, MAX_GAIN, GAIN_STEP)
}

pub fn bandwidth_range() -> MetaRange {
    MetaRange::from_ranges(vec![Range::point(DEFAULT_BANDWIDTH)])
}

pub fn lo_freq_range(stage: LoStage) -> MetaRange {
    match stage {
        LoStage::Lo1 => MetaRange::new(LO1_MIN_FREQ, LO1_MAX_FREQ, 1.0),
        LoStage::Lo2 => MetaRange::from_ranges(vec![Range::point(LO2_FREQ)]),
    }
}

pub fn lo_gain_range() -> MetaRange {
    MetaRange::new(MIN_LO_GAIN, MAX_LO_GAIN, GAIN_STEP)
}

pub fn lo_power_range() -> MetaRange {
    MetaRange::new(MIN_LO_POWER, MAX_LO_POWER, 1.0)
}

pub fn antennas(dir: Direction) -> &'static [&'static str] {
    match dir {
        Direction::Rx => RX_ANTENNAS,
        Direction::Tx => TX_ANTENNAS,
    }
}

pub fn default_antenna(dir: Direction) -> &'static str {
    match dir {
        Direction::Rx => DEFAULT_RX_ANTENNA,
        Direction::Tx => DEFAULT_TX_ANTENNA,
    }
}

pub fn lo_sources(stage: LoStage) -> &'static [&'static str] {
    match stage {
        LoStage::Lo1 => &["internal", "external"],
        LoStage::Lo2 => &["internal"],
    }
}

/// Samples per packet that fit in one receive MTU
pub fn default_spp(recv_mtu: usize) -> usize {
    recv_mtu.saturating_sub(MAX_HEADER_BYTES) / BYTES_PER_SAMPLE
}

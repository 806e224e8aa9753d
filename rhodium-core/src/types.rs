//! Value types stored in the property tree

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rpc::RpcError;

/// RF path direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Rx,
    Tx,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Rx, Direction::Tx];

    /// Name used on the peripheral manager RPC interface
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Rx => "RX",
            Direction::Tx => "TX",
        }
    }

    /// Tree directory holding this direction's channels
    pub fn frontends(&self) -> &'static str {
        match self {
            Direction::Rx => "rx_frontends",
            Direction::Tx => "tx_frontends",
        }
    }

    pub fn codecs(&self) -> &'static str {
        match self {
            Direction::Rx => "rx_codecs",
            Direction::Tx => "tx_codecs",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Direction::Rx => 0,
            Direction::Tx => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Local oscillator stage within one RF path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoStage {
    /// Tunable synthesizer stage
    Lo1,
    /// Fixed-frequency lowband mixing stage
    Lo2,
}

impl LoStage {
    pub const ALL: [LoStage; 2] = [LoStage::Lo1, LoStage::Lo2];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoStage::Lo1 => "LO1",
            LoStage::Lo2 => "LO2",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            LoStage::Lo1 => 0,
            LoStage::Lo2 => 1,
        }
    }
}

impl fmt::Display for LoStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for LoStage {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_uppercase().as_str() {
            "LO1" => Ok(LoStage::Lo1),
            "LO2" => Ok(LoStage::Lo2),
            _ => Err(format!("Unknown LO stage: {}", s)),
        }
    }
}

/// Where an LO stage takes its signal from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoSource {
    #[default]
    Internal,
    External,
}

impl LoSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoSource::Internal => "internal",
            LoSource::External => "external",
        }
    }
}

impl fmt::Display for LoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for LoSource {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_lowercase().as_str() {
            "internal" => Ok(LoSource::Internal),
            "external" => Ok(LoSource::External),
            _ => Err(format!("Unknown LO source: {}", s)),
        }
    }
}

/// A contiguous range with an optional step (0 = continuous)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl Range {
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        Range { start, stop, step }
    }

    /// A range holding exactly one value
    pub fn point(value: f64) -> Self {
        Range::new(value, value, 0.0)
    }
}

/// An ordered list of ranges, advertised as capability data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaRange(Vec<Range>);

impl MetaRange {
    pub fn new(start: f64, stop: f64, step: f64) -> Self {
        MetaRange(vec![Range::new(start, stop, step)])
    }

    pub fn from_ranges(ranges: Vec<Range>) -> Self {
        MetaRange(ranges)
    }

    pub fn ranges(&self) -> &[Range] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn start(&self) -> f64 {
        self.0
            .iter()
            .map(|r| r.start)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn stop(&self) -> f64 {
        self.0
            .iter()
            .map(|r| r.stop)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Smallest non-zero step across all ranges, or 0 when continuous
    pub fn step(&self) -> f64 {
        self.0
            .iter()
            .map(|r| r.step)
            .filter(|s| *s > 0.0)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.min(s))))
            .unwrap_or(0.0)
    }

    pub fn contains(&self, value: f64) -> bool {
        self.0.iter().any(|r| value >= r.start && value <= r.stop)
    }

    /// Move `value` into the nearest range. With `clip_step`, snap it to that
    /// range's step grid as well. NaN has no nearest range and maps to
    /// [`start`](Self::start).
    pub fn clip(&self, value: f64, clip_step: bool) -> f64 {
        if self.is_empty() {
            return value;
        }
        if value.is_nan() {
            return self.start();
        }
        // Bound first so infinite requests still have a nearest range
        let value = value.clamp(self.start(), self.stop());
        let mut best: Option<(f64, f64)> = None;
        for range in &self.0 {
            let mut candidate = value.clamp(range.start, range.stop);
            if clip_step && range.step > 0.0 {
                let steps = ((candidate - range.start) / range.step).round();
                candidate = (range.start + steps * range.step).min(range.stop);
            }
            let distance = (candidate - value).abs();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((candidate, distance));
            }
        }
        best.map_or(value, |(candidate, _)| candidate)
    }
}

/// Kind of data a sensor reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SensorType {
    Boolean,
    Integer,
    Realnum,
    String,
}

impl SensorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Boolean => "BOOLEAN",
            SensorType::Integer => "INTEGER",
            SensorType::Realnum => "REALNUM",
            SensorType::String => "STRING",
        }
    }
}

impl TryFrom<&str> for SensorType {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_uppercase().as_str() {
            "BOOLEAN" => Ok(SensorType::Boolean),
            "INTEGER" => Ok(SensorType::Integer),
            "REALNUM" => Ok(SensorType::Realnum),
            "STRING" => Ok(SensorType::String),
            _ => Err(format!("Unknown sensor type: {}", s)),
        }
    }
}

/// A sensor reading. Values are kept in string form as reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorValue {
    pub name: String,
    pub value: String,
    pub unit: String,
    #[serde(rename = "type")]
    pub data_type: SensorType,
}

impl SensorValue {
    /// Boolean sensor; the unit is chosen from the true/false pair
    pub fn boolean(name: &str, value: bool, true_unit: &str, false_unit: &str) -> Self {
        SensorValue {
            name: name.to_string(),
            value: value.to_string(),
            unit: if value { true_unit } else { false_unit }.to_string(),
            data_type: SensorType::Boolean,
        }
    }

    pub fn to_bool(&self) -> Option<bool> {
        match self.data_type {
            SensorType::Boolean => self.value.parse().ok(),
            _ => None,
        }
    }

    pub fn to_real(&self) -> Option<f64> {
        match self.data_type {
            SensorType::Integer | SensorType::Realnum => self.value.parse().ok(),
            _ => None,
        }
    }

    /// Build from the string record the peripheral manager returns
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, RpcError> {
        let field = |key: &str| {
            map.get(key)
                .cloned()
                .ok_or_else(|| RpcError::Malformed(format!("sensor record missing '{}'", key)))
        };
        let data_type = SensorType::try_from(field("type")?.as_str()).map_err(RpcError::Malformed)?;
        Ok(SensorValue {
            name: field("name")?,
            value: field("value")?,
            unit: map.get("unit").cloned().unwrap_or_default(),
            data_type,
        })
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.data_type {
            SensorType::Boolean => write!(f, "{}: {}", self.name, self.unit),
            _ => write!(f, "{}: {} {}", self.name, self.value, self.unit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_names() {
        assert_eq!(Direction::Rx.to_string(), "RX");
        assert_eq!(Direction::Tx.frontends(), "tx_frontends");
        assert_eq!(LoStage::Lo2.to_string(), "LO2");
        assert_eq!(LoStage::try_from("lo1"), Ok(LoStage::Lo1));
        assert_eq!(LoSource::try_from("External"), Ok(LoSource::External));
        assert!(LoSource::try_from("pll").is_err());
    }

    #[test]
    fn test_meta_range_bounds() {
        let r = MetaRange::from_ranges(vec![Range::new(10.0, 20.0, 1.0), Range::new(30.0, 40.0, 0.5)]);
        assert_eq!(r.start(), 10.0);
        assert_eq!(r.stop(), 40.0);
        assert_eq!(r.step(), 0.5);
        assert!(r.contains(35.0));
        assert!(!r.contains(25.0));
    }

    #[test]
    fn test_meta_range_clip() {
        let r = MetaRange::new(0.0, 60.0, 1.0);
        assert_eq!(r.clip(75.0, true), 60.0);
        assert_eq!(r.clip(-3.0, true), 0.0);
        assert_eq!(r.clip(12.4, true), 12.0);
        assert_eq!(r.clip(12.4, false), 12.4);

        let gaps = MetaRange::from_ranges(vec![Range::new(10.0, 20.0, 0.0), Range::new(30.0, 40.0, 0.0)]);
        assert_eq!(gaps.clip(24.0, false), 20.0);
        assert_eq!(gaps.clip(26.0, false), 30.0);

        let point = MetaRange::from_ranges(vec![Range::point(250e6)]);
        assert_eq!(point.clip(100e6, true), 250e6);
    }

    #[test]
    fn test_meta_range_clip_non_finite() {
        let r = MetaRange::new(0.0, 60.0, 1.0);
        assert_eq!(r.clip(f64::NAN, true), 0.0);
        assert_eq!(r.clip(f64::INFINITY, true), 60.0);
        assert_eq!(r.clip(f64::NEG_INFINITY, false), 0.0);
        assert!(r.contains(r.clip(f64::NAN, false)));

        let gaps = MetaRange::from_ranges(vec![Range::new(10.0, 20.0, 0.0), Range::new(30.0, 40.0, 0.0)]);
        assert_eq!(gaps.clip(f64::INFINITY, false), 40.0);
    }

    #[test]
    fn test_boolean_sensor() {
        let s = SensorValue::boolean("lo_locked", true, "locked", "unlocked");
        assert_eq!(s.to_bool(), Some(true));
        assert_eq!(s.to_string(), "lo_locked: locked");
        let s = SensorValue::boolean("lo_locked", false, "locked", "unlocked");
        assert_eq!(s.unit, "unlocked");
    }

    #[test]
    fn test_sensor_from_map() {
        let map: HashMap<String, String> = [
            ("name", "temperature"),
            ("type", "REALNUM"),
            ("value", "41.5"),
            ("unit", "C"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let s = SensorValue::from_map(&map).unwrap();
        assert_eq!(s.to_real(), Some(41.5));
        assert_eq!(s.data_type, SensorType::Realnum);

        let mut broken = map.clone();
        broken.remove("value");
        assert!(matches!(SensorValue::from_map(&broken), Err(RpcError::Malformed(_))));

        let mut bad_type = map;
        bad_type.insert("type".into(), "COMPLEX".into());
        assert!(SensorValue::from_map(&bad_type).is_err());
    }

    #[test]
    fn test_sensor_serde() {
        let s = SensorValue::boolean("ref_locked", true, "locked", "unlocked");
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains(r#""type":"BOOLEAN""#));
        let back: SensorValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}

//! In-memory stand-ins for the control bus and the peripheral manager
//!
//! Used by the unit tests and for bringing up the controller without a
//! board attached.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};

use crate::hw::{HardwareError, RegisterBus};
use crate::rpc::{RpcError, RpcTransport};
use crate::types::{Direction, SensorValue};

/// Writes kept by [`EmulatedBus::pokes`]; older ones are dropped
pub const POKE_HISTORY: usize = 4096;

#[derive(Default)]
struct BusState {
    registers: HashMap<u32, u32>,
    readback: HashMap<u32, u32>,
    pokes: VecDeque<(u32, u32)>,
    failing: bool,
}

/// Register file that records the most recent writes
#[derive(Default)]
pub struct EmulatedBus {
    state: Mutex<BusState>,
}

impl EmulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The last [`POKE_HISTORY`] writes, oldest first
    pub fn pokes(&self) -> Vec<(u32, u32)> {
        self.lock().pokes.iter().copied().collect()
    }

    pub fn clear_pokes(&self) {
        self.lock().pokes.clear();
    }

    /// Last value written to `addr`
    pub fn register(&self, addr: u32) -> Option<u32> {
        self.lock().registers.get(&addr).copied()
    }

    /// Value returned by reads of `addr` (0 when unset)
    pub fn set_readback(&self, addr: u32, value: u32) {
        self.lock().readback.insert(addr, value);
    }

    /// Make every transaction fail
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }
}

impl RegisterBus for EmulatedBus {
    fn poke32(&self, addr: u32, data: u32) -> Result<(), HardwareError> {
        let mut state = self.lock();
        if state.failing {
            return Err(HardwareError::Bus(format!("write to 0x{:x} failed", addr)));
        }
        state.registers.insert(addr, data);
        if state.pokes.len() == POKE_HISTORY {
            state.pokes.pop_front();
        }
        state.pokes.push_back((addr, data));
        Ok(())
    }

    fn peek32(&self, addr: u32) -> Result<u32, HardwareError> {
        let state = self.lock();
        if state.failing {
            return Err(HardwareError::Bus(format!("read of 0x{:x} failed", addr)));
        }
        Ok(state.readback.get(&addr).copied().unwrap_or(0))
    }
}

#[derive(Default)]
struct MpmState {
    sensors: HashMap<Direction, Vec<SensorValue>>,
    calls: HashMap<String, usize>,
    failure: Option<RpcError>,
}

/// Peripheral manager serving `<prefix>get_sensors` and `<prefix>get_sensor`
pub struct EmulatedMpm {
    prefix: String,
    token: String,
    state: Mutex<MpmState>,
}

impl EmulatedMpm {
    pub fn new(prefix: &str, token: &str) -> Self {
        EmulatedMpm {
            prefix: prefix.to_string(),
            token: token.to_string(),
            state: Mutex::new(MpmState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MpmState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a sensor
    pub fn set_sensor(&self, dir: Direction, sensor: SensorValue) {
        let mut state = self.lock();
        let sensors = state.sensors.entry(dir).or_default();
        match sensors.iter_mut().find(|s| s.name == sensor.name) {
            Some(existing) => *existing = sensor,
            None => sensors.push(sensor),
        }
    }

    /// Number of calls made to `method` (without prefix)
    pub fn call_count(&self, method: &str) -> usize {
        let full = format!("{}{}", self.prefix, method);
        self.lock().calls.get(&full).copied().unwrap_or(0)
    }

    /// Fail every following call with `error`, or stop failing with `None`
    pub fn fail_with(&self, error: Option<RpcError>) {
        self.lock().failure = error;
    }

    fn string_param(params: &[Value], index: usize) -> Result<&str, RpcError> {
        params
            .get(index)
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::Remote(format!("missing string argument {}", index)))
    }

    fn direction(name: &str) -> Result<Direction, RpcError> {
        Direction::ALL
            .into_iter()
            .find(|d| d.as_str() == name)
            .ok_or_else(|| RpcError::Remote(format!("invalid direction {}", name)))
    }
}

impl RpcTransport for EmulatedMpm {
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let mut state = self.lock();
        *state.calls.entry(method.to_string()).or_default() += 1;
        if let Some(error) = &state.failure {
            return Err(error.clone());
        }
        if Self::string_param(&params, 0)? != self.token {
            return Err(RpcError::Remote("invalid session token".to_string()));
        }

        let name = method.strip_prefix(&self.prefix).unwrap_or(method);
        match name {
            "get_sensors" => {
                let dir = Self::direction(Self::string_param(&params, 1)?)?;
                let names: Vec<&str> = state
                    .sensors
                    .get(&dir)
                    .map(|s| s.iter().map(|v| v.name.as_str()).collect())
                    .unwrap_or_default();
                Ok(json!(names))
            }
            "get_sensor" => {
                let dir = Self::direction(Self::string_param(&params, 1)?)?;
                let sensor_name = Self::string_param(&params, 2)?;
                let sensor = state
                    .sensors
                    .get(&dir)
                    .and_then(|s| s.iter().find(|v| v.name == sensor_name))
                    .ok_or_else(|| RpcError::Remote(format!("no such sensor: {}", sensor_name)))?;
                Ok(json!({
                    "name": sensor.name,
                    "type": sensor.data_type.as_str(),
                    "value": sensor.value,
                    "unit": sensor.unit,
                }))
            }
            _ => Err(RpcError::Remote(format!("unknown method {}", method))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::RpcClient;
    use std::sync::Arc;

    #[test]
    fn test_bus_records_and_fails() {
        let bus = EmulatedBus::new();
        bus.poke32(8, 1).unwrap();
        bus.poke32(8, 2).unwrap();
        assert_eq!(bus.register(8), Some(2));
        assert_eq!(bus.pokes(), vec![(8, 1), (8, 2)]);
        assert_eq!(bus.peek32(16).unwrap(), 0);

        bus.set_failing(true);
        assert!(matches!(bus.poke32(8, 3), Err(HardwareError::Bus(_))));
        assert_eq!(bus.register(8), Some(2));
    }

    #[test]
    fn test_poke_history_is_bounded() {
        let bus = EmulatedBus::new();
        for i in 0..(POKE_HISTORY as u32 + 10) {
            bus.poke32(4, i).unwrap();
        }
        let pokes = bus.pokes();
        assert_eq!(pokes.len(), POKE_HISTORY);
        assert_eq!(pokes[0], (4, 10));
        assert_eq!(pokes.last(), Some(&(4, POKE_HISTORY as u32 + 9)));
        assert_eq!(bus.register(4), Some(POKE_HISTORY as u32 + 9));

        bus.clear_pokes();
        assert!(bus.pokes().is_empty());
    }

    #[test]
    fn test_mpm_serves_sensors() {
        let mpm = Arc::new(EmulatedMpm::new("db_0_", "tok"));
        mpm.set_sensor(Direction::Rx, SensorValue::boolean("lowband_lo_locked", true, "locked", "unlocked"));
        let client = RpcClient::new(mpm.clone(), "tok");

        let names: Vec<String> = client.request_with_token("db_0_get_sensors", ("RX",)).unwrap();
        assert_eq!(names, vec!["lowband_lo_locked"]);
        let none: Vec<String> = client.request_with_token("db_0_get_sensors", ("TX",)).unwrap();
        assert!(none.is_empty());

        let record: HashMap<String, String> = client
            .request_with_token("db_0_get_sensor", ("RX", "lowband_lo_locked", 0))
            .unwrap();
        assert_eq!(SensorValue::from_map(&record).unwrap().to_bool(), Some(true));
        assert_eq!(mpm.call_count("get_sensors"), 2);
    }

    #[test]
    fn test_mpm_rejects_bad_token() {
        let mpm = Arc::new(EmulatedMpm::new("db_0_", "tok"));
        let client = RpcClient::new(mpm, "stale");
        let res: Result<Vec<String>, _> = client.request_with_token("db_0_get_sensors", ("RX",));
        assert!(matches!(res, Err(RpcError::Remote(_))));
    }
}

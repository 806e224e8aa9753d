//! Sensors served by the peripheral manager

use std::collections::HashMap;

use super::FrontendController;
use crate::error::TreeError;
use crate::types::{Direction, SensorValue};

impl FrontendController {
    /// Ask the peripheral manager which `dir` sensors exist and add a
    /// read-only node for each under `<fe_path>/sensors`. Every read of such
    /// a node is one RPC round trip.
    ///
    /// Names that collide with an existing sensor node are skipped, so local
    /// sensors keep their publisher. Returns the number of nodes added.
    pub fn init_mpm_sensors(&self, dir: Direction, chan: usize) -> Result<usize, TreeError> {
        let trx = dir.as_str();
        let sensors_path = self.fe_path(dir, chan).join("sensors");
        let sensor_list: Vec<String> = self
            .rpc
            .request_with_token(&self.config.rpc_method("get_sensors"), (trx,))?;
        log::trace!("Chan {}: Found {} {} sensors.", chan, sensor_list.len(), trx);

        let mut added = 0;
        for sensor_name in sensor_list {
            if sensor_name.is_empty() || sensor_name.contains('/') {
                log::warn!("Ignoring {} sensor with unusable name '{}'", trx, sensor_name);
                continue;
            }
            let path = sensors_path.join(&sensor_name);
            if self.tree.exists(&path) {
                log::warn!("{} sensor {} already exists, keeping the local one", trx, path);
                continue;
            }
            log::trace!("Adding {} sensor {}", trx, sensor_name);

            let rpc = self.rpc.clone();
            let method = self.config.rpc_method("get_sensor");
            self.tree
                .create::<SensorValue>(&path)?
                .set_publisher(move || {
                    let record: HashMap<String, String> =
                        rpc.request_with_token(&method, (trx, &sensor_name, chan))?;
                    Ok(SensorValue::from_map(&record)?)
                })
                .make_read_only();
            added += 1;
        }
        Ok(added)
    }
}

//! Frontend tree layout for one channel

use std::sync::Arc;

use super::constants::*;
use super::{coercer, publisher, subscriber, FrontendController};
use crate::error::TreeError;
use crate::tree::{PropertyTree, PropertyValue};
use crate::types::{Direction, LoStage, MetaRange, SensorValue};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Create a capability node holding `value` that rejects every write
fn capability<T: PropertyValue>(fe: &PropertyTree, path: &str, value: T) -> Result<(), TreeError> {
    fe.create::<T>(path)?.set(value)?.make_read_only();
    Ok(())
}

impl FrontendController {
    /// Create every node under `dboards/<slot>/<dir>_frontends/<chan>`
    pub(crate) fn init_frontend_subtree(self: &Arc<Self>, dir: Direction, chan: usize) -> Result<(), TreeError> {
        let fe_path = self.fe_path(dir, chan);
        log::debug!("Adding frontend properties for {} channel {} to {}", dir, chan, fe_path);
        let fe = self.tree.subtree(&fe_path);
        let weak = Arc::downgrade(self);

        // Standard attributes
        fe.create::<String>("name")?.set(FRONTEND_NAME.to_string())?;
        fe.create::<String>("connection")?
            .set_coercer(coercer(&weak, move |ctrl, conn| ctrl.set_fe_connection(dir, conn)))
            .set_publisher(publisher(&weak, move |ctrl| Ok(ctrl.fe_connection(dir))));

        // Antenna
        fe.create::<String>("antenna/value")?
            .set_coercer(coercer(&weak, move |ctrl, ant| ctrl.set_antenna(dir, ant, chan)))
            .set_publisher(publisher(&weak, move |ctrl| ctrl.antenna(dir, chan)));
        capability(&fe, "antenna/options", strings(antennas(dir)))?;

        // Frequency
        fe.create::<f64>("freq/value")?
            .set_coercer(coercer(&weak, move |ctrl, freq| ctrl.set_frequency(dir, freq, chan)))
            .set_publisher(publisher(&weak, move |ctrl| ctrl.frequency(dir, chan)));
        capability(&fe, "freq/range", freq_range())?;

        // Bandwidth
        fe.create::<f64>("bandwidth/value")?
            .set_coercer(coercer(&weak, move |ctrl, bw| ctrl.set_bandwidth(dir, bw, chan)))
            .set_publisher(publisher(&weak, move |ctrl| ctrl.bandwidth(dir, chan)));
        capability(&fe, "bandwidth/range", bandwidth_range())?;

        // Gain
        fe.create::<f64>("gains/all/value")?
            .set_coercer(coercer(&weak, move |ctrl, gain| ctrl.set_gain(dir, gain, chan)))
            .set_publisher(publisher(&weak, move |ctrl| ctrl.gain(dir, chan)));
        capability(&fe, "gains/all/range", gain_range(dir))?;

        capability(&fe, "gains/all/profile/options", strings(GAIN_PROFILE_OPTIONS))?;
        fe.create::<String>("gains/all/profile/value")?
            .set_coercer(coercer(&weak, move |ctrl, profile| Ok(ctrl.set_gain_profile(dir, profile))))
            .set_publisher(publisher(&weak, move |ctrl| Ok(ctrl.gain_profile(dir))));

        // LO lock sensor
        fe.create::<SensorValue>("sensors/lo_locked")?
            .set(SensorValue::boolean("all_los", false, "locked", "unlocked"))?
            .set_publisher(publisher(&weak, move |ctrl| {
                Ok(SensorValue::boolean(
                    "all_los",
                    ctrl.lo_lock_status(dir)?,
                    "locked",
                    "unlocked",
                ))
            }))
            .make_read_only();

        for stage in LoStage::ALL {
            self.init_lo_subtree(&fe.subtree(format!("los/{}", stage)), dir, stage, chan)?;
        }
        Ok(())
    }

    fn init_lo_subtree(
        self: &Arc<Self>,
        lo: &PropertyTree,
        dir: Direction,
        stage: LoStage,
        chan: usize,
    ) -> Result<(), TreeError> {
        let weak = Arc::downgrade(self);

        lo.create::<f64>("freq/value")?
            .set_coercer(coercer(&weak, move |ctrl, freq| ctrl.set_lo_freq(dir, stage, freq, chan)))
            .set_publisher(publisher(&weak, move |ctrl| ctrl.lo_freq(dir, stage, chan)));
        capability::<MetaRange>(lo, "freq/range", self.lo_freq_range(stage))?;

        capability(lo, "source/options", self.lo_sources(stage))?;
        lo.create::<String>("source/value")?
            .add_subscriber(subscriber(&weak, move |ctrl, src: &String| {
                ctrl.set_lo_source(dir, stage, src, chan)
            }))
            .set_publisher(publisher(&weak, move |ctrl| ctrl.lo_source(dir, stage, chan)));

        lo.create::<bool>("export/value")?
            .add_subscriber(subscriber(&weak, move |ctrl, enabled: &bool| {
                ctrl.set_lo_export(dir, stage, *enabled, chan)
            }))
            .set_publisher(publisher(&weak, move |ctrl| ctrl.lo_export(dir, stage, chan)));

        lo.create::<f64>(format!("gains/{}/value", LO_GAIN_NAME))?
            .set_coercer(coercer(&weak, move |ctrl, gain| ctrl.set_lo_gain(dir, stage, gain, chan)))
            .set_publisher(publisher(&weak, move |ctrl| ctrl.lo_gain(dir, stage, chan)));
        capability(lo, &format!("gains/{}/range", LO_GAIN_NAME), lo_gain_range())?;

        lo.create::<f64>(format!("gains/{}/value", LO_POWER_NAME))?
            .set_coercer(coercer(&weak, move |ctrl, power| ctrl.set_lo_power(dir, stage, power, chan)))
            .set_publisher(publisher(&weak, move |ctrl| ctrl.lo_power(dir, stage, chan)));
        capability(lo, &format!("gains/{}/range", LO_POWER_NAME), lo_power_range())?;
        Ok(())
    }
}

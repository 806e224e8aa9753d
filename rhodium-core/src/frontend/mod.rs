//! RF frontend controller
//!
//! Wires every control point of the daughterboard into the property tree and
//! gives the tree nodes their hardware meaning. Construction happens in a
//! fixed order, each step relying on the one before:
//!
//! 1. static defaults for every channel, before any peripheral exists
//! 2. samples-per-packet derived from the receive MTU
//! 3. peripheral drivers (SPI, CPLD, both LO synthesizers, GPIO,
//!    correction cores)
//! 4. initial gain programming
//! 5. tree population, then remote sensor discovery
//!
//! [`FrontendController::make`] runs all of them. The steps are public so
//! callers (and tests) can observe the state between them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use num_complex::Complex64;

use crate::config::FrontendConfig;
use crate::error::TreeError;
use crate::hw::fe_core::{DEFAULT_DC_OFFSET_ENABLE, DEFAULT_DC_OFFSET_VALUE, DEFAULT_IQ_BALANCE_VALUE};
use crate::hw::{
    regs, spi_reader, spi_writer, AtrMode, Cpld, GpioAtr, GpioPins, HardwareError, MashOrder,
    PinDirection, RegisterBus, RxFrontendCore, SlaveSelect, SpiConfig, SpiCore, SpiIface,
    Synthesizer, TxFrontendCore,
};
use crate::rpc::RpcClient;
use crate::tree::{Property, PropertyPath, PropertyTree, PropertyValue};
use crate::types::{Direction, LoSource, LoStage};

pub mod constants;
mod sensors;
mod subtree;
mod tuning;

use constants::*;

/// Cached state of one LO stage of one channel
#[derive(Debug, Clone)]
struct LoState {
    frequency: f64,
    gain: f64,
    power: f64,
    source: LoSource,
    export: bool,
}

impl LoState {
    fn new(stage: LoStage) -> Self {
        LoState {
            frequency: match stage {
                LoStage::Lo1 => DEFAULT_FREQ,
                LoStage::Lo2 => LO2_FREQ,
            },
            gain: DEFAULT_INVALID_GAIN,
            power: MIN_LO_POWER,
            source: LoSource::Internal,
            export: false,
        }
    }
}

/// Cached state of one RF channel
#[derive(Debug, Clone)]
struct ChannelState {
    frequency: f64,
    gain: f64,
    antenna: String,
    bandwidth: f64,
    los: [LoState; 2],
}

impl ChannelState {
    fn with_defaults(dir: Direction) -> Self {
        ChannelState {
            frequency: DEFAULT_FREQ,
            gain: DEFAULT_INVALID_GAIN,
            antenna: default_antenna(dir).to_string(),
            bandwidth: DEFAULT_BANDWIDTH,
            los: [LoState::new(LoStage::Lo1), LoState::new(LoStage::Lo2)],
        }
    }

    fn lo(&mut self, stage: LoStage) -> &mut LoState {
        &mut self.los[stage.index()]
    }
}

/// Peripheral drivers, exclusively owned by the controller
pub(crate) struct Peripherals {
    cpld: Cpld,
    tx_lo: Synthesizer,
    rx_lo: Synthesizer,
    gpio: GpioAtr,
    rx_fe_core: Arc<RxFrontendCore>,
    tx_fe_core: Arc<TxFrontendCore>,
}

impl Peripherals {
    fn lo(&self, dir: Direction) -> &Synthesizer {
        match dir {
            Direction::Rx => &self.rx_lo,
            Direction::Tx => &self.tx_lo,
        }
    }
}

struct FrontendState {
    channels: [Vec<ChannelState>; 2],
    gain_profile: [String; 2],
    peripherals: Option<Arc<Peripherals>>,
}

/// Controller for one daughterboard
pub struct FrontendController {
    config: FrontendConfig,
    tree: PropertyTree,
    rpc: RpcClient,
    state: Mutex<FrontendState>,
}

impl std::fmt::Debug for FrontendController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontendController")
            .field("slot", &self.config.radio_slot)
            .field("block", &self.config.block_id)
            .finish_non_exhaustive()
    }
}

impl FrontendController {
    /// Apply the static defaults (step 1) and the derived packet size
    /// (step 2). No peripheral is touched.
    pub fn new(config: FrontendConfig, tree: PropertyTree, rpc: RpcClient) -> Result<Arc<Self>, TreeError> {
        log::trace!(
            "Initializing defaults: {} RX, {} TX channels",
            config.num_rx_channels,
            config.num_tx_channels
        );
        let channels = [
            (0..config.num_rx_channels)
                .map(|_| ChannelState::with_defaults(Direction::Rx))
                .collect(),
            (0..config.num_tx_channels)
                .map(|_| ChannelState::with_defaults(Direction::Tx))
                .collect(),
        ];
        let controller = Arc::new(FrontendController {
            config,
            tree,
            rpc,
            state: Mutex::new(FrontendState {
                channels,
                gain_profile: [DEFAULT_GAIN_PROFILE.to_string(), DEFAULT_GAIN_PROFILE.to_string()],
                peripherals: None,
            }),
        });
        controller.init_spp()?;
        Ok(controller)
    }

    /// Run every initialization step in order
    pub fn make(
        config: FrontendConfig,
        tree: PropertyTree,
        rpc: RpcClient,
        bus: Arc<dyn RegisterBus>,
    ) -> Result<Arc<Self>, TreeError> {
        let controller = Self::new(config, tree, rpc)?;
        controller.init_peripherals(bus)?;
        controller.init_prop_tree()?;
        for dir in Direction::ALL {
            for chan in 0..controller.num_channels(dir) {
                controller.init_mpm_sensors(dir, chan)?;
            }
        }
        Ok(controller)
    }

    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    pub fn tree(&self) -> &PropertyTree {
        &self.tree
    }

    pub fn num_channels(&self, dir: Direction) -> usize {
        match dir {
            Direction::Rx => self.config.num_rx_channels,
            Direction::Tx => self.config.num_tx_channels,
        }
    }

    /// `blocks/<block_id>`
    pub fn root_path(&self) -> PropertyPath {
        PropertyPath::new("blocks").join(&self.config.block_id)
    }

    /// `dboards/<slot>/{rx,tx}_frontends/<chan>`
    pub fn fe_path(&self, dir: Direction, chan: usize) -> PropertyPath {
        PropertyPath::new("dboards")
            .join(&self.config.radio_slot)
            .join(dir.frontends())
            .join(chan)
    }

    pub fn has_peripherals(&self) -> bool {
        self.lock().peripherals.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, FrontendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn peripherals(&self) -> Result<Arc<Peripherals>, HardwareError> {
        self.lock()
            .peripherals
            .clone()
            .ok_or_else(|| HardwareError::NotInitialized("frontend peripherals".to_string()))
    }

    /// Run `f` on the cached state of one channel
    fn with_channel<R>(
        &self,
        dir: Direction,
        chan: usize,
        f: impl FnOnce(&mut ChannelState) -> R,
    ) -> Result<R, TreeError> {
        let mut state = self.lock();
        let channel = state.channels[dir.index()]
            .get_mut(chan)
            .ok_or_else(|| TreeError::InvalidValue(format!("no {} channel {}", dir, chan)))?;
        Ok(f(channel))
    }

    /// Run `f` on every channel of `dir`. The CPLD fields and the LO
    /// synthesizer are per direction, so state they back is kept identical
    /// across the direction's channels.
    fn with_direction(&self, dir: Direction, mut f: impl FnMut(&mut ChannelState)) {
        self.lock().channels[dir.index()].iter_mut().for_each(|ch| f(ch));
    }

    fn check_channel(&self, dir: Direction, chan: usize) -> Result<(), TreeError> {
        self.with_channel(dir, chan, |_| ())
    }

    /// Access `path`, creating it first when absent
    fn access_or_create<T: PropertyValue>(&self, path: &PropertyPath) -> Result<Property<T>, TreeError> {
        if self.tree.exists(path) {
            self.tree.access(path)
        } else {
            self.tree.create(path)
        }
    }

    /// Step 2: derive the default samples-per-packet from the receive MTU
    fn init_spp(&self) -> Result<(), TreeError> {
        let mtu_path = PropertyPath::new("mtu/recv");
        let mtu = self.access_or_create::<usize>(&mtu_path)?;
        if !mtu.has_value() {
            mtu.set(self.config.recv_mtu)?;
        }
        let spp = default_spp(mtu.get()?);
        log::debug!("Setting default spp to {}", spp);

        let spp = i32::try_from(spp)
            .map_err(|_| TreeError::InvalidValue(format!("samples per packet {} out of range", spp)))?;
        let spp_path = self.root_path().join("args/spp/value");
        self.access_or_create::<i32>(&spp_path)?.set(spp)?;
        Ok(())
    }

    /// Steps 3 and 4: build the peripheral drivers on `bus`, then program
    /// the initial gains through them
    pub fn init_peripherals(&self, bus: Arc<dyn RegisterBus>) -> Result<(), TreeError> {
        if self.has_peripherals() {
            return Err(TreeError::InvalidValue("peripherals already initialized".to_string()));
        }
        log::trace!("Initializing peripherals...");

        log::trace!("Initializing SPI core...");
        let spi: Arc<dyn SpiIface> = Arc::new(SpiCore::with_default_regs(bus.clone()));

        log::trace!("Initializing CPLD...");
        let cpld = Cpld::new(
            spi_writer(spi.clone(), SlaveSelect::Cpld, SpiConfig::cpld()),
            spi_reader(spi.clone(), SlaveSelect::Cpld, SpiConfig::cpld()),
        );

        log::trace!("Initializing TX LO...");
        let tx_lo = Synthesizer::new(
            spi_writer(spi.clone(), SlaveSelect::TxLo, SpiConfig::tx_lo()),
            spi_reader(spi.clone(), SlaveSelect::TxLo, SpiConfig::tx_lo()),
        );
        tx_lo.set_reference_frequency(LO1_REF_FREQ)?;
        tx_lo.set_mash_order(MashOrder::Third)?;

        log::trace!("Initializing RX LO...");
        let rx_lo = Synthesizer::new(
            spi_writer(spi.clone(), SlaveSelect::RxLo, SpiConfig::rx_lo()),
            spi_reader(spi, SlaveSelect::RxLo, SpiConfig::rx_lo()),
        );
        rx_lo.set_reference_frequency(LO1_REF_FREQ)?;
        rx_lo.set_mash_order(MashOrder::Third)?;

        log::trace!("Initializing GPIOs...");
        let gpio = GpioAtr::with_default_regs(bus.clone());
        gpio.set_atr_mode(AtrMode::Gpio, GpioPins::ALL)?;
        gpio.set_gpio_ddr(PinDirection::Output, GpioPins::ALL)?;
        log::trace!("Setting Switch 10 to 0x1");
        gpio.set_gpio_out(0x1, GpioPins::SWITCH10)?;

        let rx_fe_core = Arc::new(RxFrontendCore::new(bus.clone(), regs::RX_FE_BASE));
        rx_fe_core.set_adc_rate(self.config.master_clock_rate);
        rx_fe_core.set_dc_offset(DEFAULT_DC_OFFSET_VALUE)?;
        rx_fe_core.set_dc_offset_auto(DEFAULT_DC_OFFSET_ENABLE)?;
        rx_fe_core.populate_subtree(&self.tree.subtree(self.root_path().join("rx_fe_corrections/0")))?;

        let tx_fe_core = Arc::new(TxFrontendCore::new(bus, regs::TX_FE_BASE));
        tx_fe_core.set_dc_offset(DEFAULT_DC_OFFSET_VALUE)?;
        tx_fe_core.set_iq_balance(DEFAULT_IQ_BALANCE_VALUE)?;
        tx_fe_core.populate_subtree(&self.tree.subtree(self.root_path().join("tx_fe_corrections/0")))?;

        self.lock().peripherals = Some(Arc::new(Peripherals {
            cpld,
            tx_lo,
            rx_lo,
            gpio,
            rx_fe_core,
            tx_fe_core,
        }));

        log::trace!("Writing initial gain values...");
        for dir in [Direction::Tx, Direction::Rx] {
            for chan in 0..self.num_channels(dir) {
                self.set_gain(dir, DEFAULT_GAIN, chan)?;
                self.set_lo_gain(dir, LoStage::Lo1, DEFAULT_LO_GAIN, chan)?;
            }
        }
        Ok(())
    }

    /// Step 5: populate the frontend tree for every channel, plus the
    /// board-level codec and clock nodes
    pub fn init_prop_tree(self: &Arc<Self>) -> Result<(), TreeError> {
        for dir in Direction::ALL {
            for chan in 0..self.num_channels(dir) {
                self.init_frontend_subtree(dir, chan)?;
            }
        }

        let slot = &self.config.radio_slot;
        for (dir, name) in [(Direction::Rx, RX_CODEC_NAME), (Direction::Tx, TX_CODEC_NAME)] {
            let path = PropertyPath::new(dir.codecs()).join(slot).join("name");
            if !self.tree.exists(&path) {
                self.tree.create::<String>(&path)?.set(name.to_string())?;
            }
        }

        if !self.tree.exists("tick_rate") {
            let weak = Arc::downgrade(self);
            self.tree
                .create::<f64>("tick_rate")?
                .set_publisher(publisher(&weak, |ctrl| Ok(ctrl.rate())));
        }
        Ok(())
    }

    /// Master clock rate the converters run at
    pub fn rate(&self) -> f64 {
        self.config.master_clock_rate
    }

    /// Current DC offset and IQ balance held by the correction cores
    pub fn corrections(&self, dir: Direction) -> Result<(Complex64, Complex64), HardwareError> {
        let hw = self.peripherals()?;
        Ok(match dir {
            Direction::Rx => (hw.rx_fe_core.dc_offset(), hw.rx_fe_core.iq_balance()),
            Direction::Tx => (hw.tx_fe_core.dc_offset(), hw.tx_fe_core.iq_balance()),
        })
    }

    /// Current GPIO pin levels
    pub fn gpio_levels(&self) -> Result<u32, HardwareError> {
        self.peripherals()?.gpio.read_gpio()
    }
}

fn upgrade(weak: &Weak<FrontendController>) -> Result<Arc<FrontendController>, TreeError> {
    weak.upgrade()
        .ok_or_else(|| TreeError::Hardware(HardwareError::NotInitialized("frontend controller".to_string())))
}

/// Coercer running `f` on the controller, if it is still alive
pub(crate) fn coercer<T, F>(
    weak: &Weak<FrontendController>,
    f: F,
) -> impl Fn(T) -> Result<T, TreeError> + Send + Sync + 'static
where
    T: PropertyValue,
    F: Fn(&FrontendController, T) -> Result<T, TreeError> + Send + Sync + 'static,
{
    let weak = weak.clone();
    move |value| {
        let ctrl = upgrade(&weak)?;
        f(&ctrl, value)
    }
}

pub(crate) fn publisher<T, F>(
    weak: &Weak<FrontendController>,
    f: F,
) -> impl Fn() -> Result<T, TreeError> + Send + Sync + 'static
where
    T: PropertyValue,
    F: Fn(&FrontendController) -> Result<T, TreeError> + Send + Sync + 'static,
{
    let weak = weak.clone();
    move || {
        let ctrl = upgrade(&weak)?;
        f(&ctrl)
    }
}

pub(crate) fn subscriber<T, F>(
    weak: &Weak<FrontendController>,
    f: F,
) -> impl Fn(&T) -> Result<(), TreeError> + Send + Sync + 'static
where
    T: PropertyValue,
    F: Fn(&FrontendController, &T) -> Result<(), TreeError> + Send + Sync + 'static,
{
    let weak = weak.clone();
    move |value: &T| {
        let ctrl = upgrade(&weak)?;
        f(&ctrl, value)
    }
}

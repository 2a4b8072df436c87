//! Daemon lifecycle.
//!
//! ```text
//! Daemon<Starting> ──start()──► Daemon<Running> ──run_until_shutdown()──► Daemon<Stopped>
//! ```
//!
//! `start` installs the termination signal handlers, then locates and acquires
//! the physical devices, builds the virtual sink and spawns one task per
//! source. A signal at any point from then on, or any failure after
//! concealment, goes through the same shutdown path so hidden nodes are always
//! put back.

pub mod shutdown;

pub use shutdown::{ShutdownCoordinator, ShutdownReport, TerminationSignals};

use crate::config::DaemonConfig;
use crate::controller::bmi160;
use crate::controller::{
    acquisition, AcquiredDevice, Concealer, DeviceError, DeviceLocator, EvdevEnumerator,
    GamepadRelay, KeyboardTranslator, MotionSampler, PhantomReaper, RetryPolicy,
};
use crate::mapping::ChordTranslator;
use crate::sink::{Capabilities, SharedSink, SinkError, UinputSink};
use crate::variant::{VariantConfig, VariantError};
use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Variant(#[from] VariantError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("Failed to install signal handlers: {0}")]
    Signal(#[source] std::io::Error),
}

#[state]
#[derive(Debug, Clone)]
pub enum DaemonState {
    Starting, // Nothing acquired yet
    Running,  // Devices hidden, loops spawned
    Stopped,  // Devices restored, loops joined
}

#[machine]
pub struct Daemon<S: DaemonState> {
    config: DaemonConfig,
    variant: VariantConfig,
    coordinator: Arc<ShutdownCoordinator>,
    report: Option<ShutdownReport>,
}

impl Daemon<Starting> {
    pub fn create(config: DaemonConfig, variant: VariantConfig) -> Self {
        info!("Preparing daemon for {} hardware", variant.variant);
        Self::new(config, variant, Arc::new(ShutdownCoordinator::new()), None)
    }

    /// Acquires everything and spawns the loops.
    pub async fn start(self) -> Result<Daemon<Running>, DaemonError> {
        let mut signals = TerminationSignals::install().map_err(DaemonError::Signal)?;
        self.coordinator.shutdown_on(async move { signals.recv().await });

        let locator = DeviceLocator::new(EvdevEnumerator, RetryPolicy::from(&self.config.retry));
        let keyboard_identity = self.variant.keyboard;
        let gamepad_identity = self.variant.gamepad;
        let keyboard = locator
            .find(&format!("keyboard {}", keyboard_identity), |d| {
                keyboard_identity.matches(d)
            })
            .await?;
        let gamepad = locator
            .find(&format!("gamepad {}", gamepad_identity), |d| {
                gamepad_identity.matches(d)
            })
            .await?;

        if self.coordinator.token().is_cancelled() {
            info!("Shutdown requested before any device was acquired");
            return Ok(self.transition());
        }

        let concealer = Concealer::new(&self.config.conceal_dir);
        let (devices, records) = acquisition::acquire_all::<evdev::Device>(
            &[keyboard.clone(), gamepad],
            &concealer,
        )?;
        self.coordinator.register_records(records).await;

        if let Err(e) = self.spawn_loops(devices, &keyboard).await {
            error!("Startup failed after devices were hidden: {}", e);
            self.coordinator.shutdown().await;
            return Err(e);
        }

        info!("Daemon running");
        Ok(self.transition())
    }

    async fn open_motion_sensor(&self) -> Option<bmi160::Bmi160<linux_embedded_hal::I2cdev>> {
        let motion = self.variant.motion?;
        if !self.config.motion.enabled {
            info!("Motion sensor disabled in config");
            return None;
        }
        let bus = self.config.motion.i2c_bus.clone();
        let address = self.config.motion.address.unwrap_or(motion.i2c_address);
        // Bring-up sleeps for the sensor power-up time.
        let opened = tokio::task::spawn_blocking(move || bmi160::open(&bus, address)).await;
        match opened {
            Ok(Ok(sensor)) => Some(sensor),
            Ok(Err(e)) => {
                warn!("Running without motion sensor: {}", e);
                None
            }
            Err(e) => {
                warn!("Running without motion sensor, bring-up task failed: {}", e);
                None
            }
        }
    }

    async fn spawn_loops(
        &self,
        devices: Vec<AcquiredDevice<evdev::Device>>,
        keyboard: &crate::controller::DeviceDescriptor,
    ) -> Result<(), DaemonError> {
        let sensor = self.open_motion_sensor().await;

        let mut caps = Capabilities::default();
        for acquired in &devices {
            caps.union(&Capabilities::from_device(&acquired.device));
        }
        caps = caps.with_keys(self.variant.chords.synthetic_keys());
        if let (Some(motion), Some(_)) = (self.variant.motion, &sensor) {
            caps = caps.with_relative(motion.axes.iter().map(|(_, code)| *code));
        }
        let uinput = UinputSink::create(&self.config.sink.name, &caps)?;
        let own_nodes = uinput.dev_nodes().to_vec();
        let sink = SharedSink::new(uinput);

        let token = self.coordinator.token();
        for acquired in devices {
            let path = acquired.descriptor.path.clone();
            let stream = acquired
                .device
                .into_event_stream()
                .map_err(|source| DeviceError::Open { path, source })?;

            if acquired.descriptor == *keyboard {
                let translator = KeyboardTranslator::new(
                    stream,
                    ChordTranslator::new(self.variant.chords),
                    sink.clone(),
                );
                self.coordinator
                    .track("keyboard", tokio::spawn(translator.run(token.clone())))
                    .await;
            } else {
                let relay = GamepadRelay::new(stream, sink.clone());
                self.coordinator
                    .track("gamepad", tokio::spawn(relay.run(token.clone())))
                    .await;
            }
        }

        if let (Some(motion), Some(sensor)) = (self.variant.motion, sensor) {
            let sampler = MotionSampler::new(
                sensor,
                motion.axes,
                Duration::from_millis(self.config.motion.poll_interval_ms),
            );
            self.coordinator
                .track("motion", tokio::spawn(sampler.run(sink.clone(), token.clone())))
                .await;
        }

        if own_nodes.is_empty() {
            warn!("Virtual device node unknown, phantom reaper disabled");
            return Ok(());
        }
        let reaper = own_nodes.into_iter().fold(
            PhantomReaper::new(
                EvdevEnumerator,
                Duration::from_millis(self.config.reaper.interval_ms),
                self.config.reaper.sweep_limit(),
            ),
            |reaper, node| reaper.protect(node),
        );
        let reaper_token = token.clone();
        self.coordinator
            .track(
                "reaper",
                tokio::spawn(async move {
                    reaper.run(reaper_token).await;
                    Ok(())
                }),
            )
            .await;

        Ok(())
    }
}

impl Daemon<Running> {
    /// Waits until a signal or a failing loop requests shutdown, then finishes
    /// it.
    pub async fn run_until_shutdown(mut self) -> Result<Daemon<Stopped>, DaemonError> {
        self.coordinator.token().cancelled().await;
        self.report = Some(self.coordinator.shutdown().await);
        Ok(self.transition())
    }
}

impl Daemon<Stopped> {
    pub fn report(&self) -> Option<&ShutdownReport> {
        self.report.as_ref()
    }
}

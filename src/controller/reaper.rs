//! Phantom device reaper
//!
//! Creating the virtual device can make the platform spawn an extra, unaddressed
//! input node next to it. Every sweep removes nodes without a bus address so
//! consumers do not count the same inputs twice. The phantom usually carries
//! the virtual device's name, so the daemon's own node is protected by path.

use super::locator::{DeviceDescriptor, InputEnumerator};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct PhantomReaper<E> {
    enumerator: E,
    interval: Duration,
    /// `None` sweeps until cancelled.
    sweeps: Option<u32>,
    /// Nodes never removed, even without a bus address.
    protected: Vec<PathBuf>,
}

impl<E: InputEnumerator> PhantomReaper<E> {
    pub fn new(enumerator: E, interval: Duration, sweeps: Option<u32>) -> Self {
        Self {
            enumerator,
            interval,
            sweeps,
            protected: Vec::new(),
        }
    }

    pub fn protect(mut self, node: impl Into<PathBuf>) -> Self {
        self.protected.push(node.into());
        self
    }

    fn is_phantom(&self, device: &DeviceDescriptor) -> bool {
        !device.has_bus_address() && !self.protected.contains(&device.path)
    }

    /// One pass over the device list. Returns how many nodes were removed.
    pub fn sweep(&self) -> usize {
        let devices = match self.enumerator.enumerate() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Reaper could not enumerate input devices: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for device in devices.iter().filter(|d| self.is_phantom(d)) {
            match std::fs::remove_file(&device.path) {
                Ok(()) => {
                    info!("Removed phantom '{}' at {}", device.name, device.path.display());
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("{} already gone", device.path.display());
                }
                Err(e) => warn!("Failed to remove {}: {}", device.path.display(), e),
            }
        }
        removed
    }

    pub async fn run(self, token: CancellationToken) {
        match self.sweeps {
            Some(n) => info!("Starting phantom reaper ({} sweeps every {:?})", n, self.interval),
            None => info!("Starting phantom reaper (every {:?})", self.interval),
        }
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut done: u32 = 0;
        let mut total = 0;

        loop {
            if self.sweeps.is_some_and(|limit| done >= limit) {
                info!("Phantom reaper finished, {} nodes removed", total);
                return;
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            total += self.sweep();
            done += 1;
        }

        info!("Phantom reaper cancelled after {} sweeps", done);
    }
}

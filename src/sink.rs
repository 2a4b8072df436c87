//! Virtual output sink
//!
//! One synthesized uinput device advertises the union of the physical
//! devices' capabilities plus whatever the chord table and motion sensor can
//! produce. All producers write through [`SharedSink`], which serialises each
//! batch and terminates it with a single sync marker so consumers never
//! observe half a chord.

use crate::mapping::RawEvent;
use evdev::uinput::VirtualDevice;
use evdev::{
    AbsInfo, AbsoluteAxisCode, AttributeSet, BusType, InputEvent, InputId, KeyCode, MiscCode,
    RelativeAxisCode, UinputAbsSetup,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const VENDOR_MICROSOFT: u16 = 0x045e;
const PRODUCT_XBOX360: u16 = 0x028e;
const VERSION: u16 = 110;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to create virtual device: {0}")]
    Create(#[source] std::io::Error),

    #[error("Failed to write to virtual device: {0}")]
    Write(#[source] std::io::Error),
}

/// Somewhere to emit batches of events.
///
/// `emit` writes every event and then one sync marker.
pub trait EventSink: Send {
    fn emit(&mut self, events: &[RawEvent]) -> Result<(), SinkError>;
}

/// Cloneable handle serialising batches from concurrent producers.
#[derive(Clone)]
pub struct SharedSink {
    inner: Arc<Mutex<Box<dyn EventSink>>>,
}

impl SharedSink {
    pub fn new(sink: impl EventSink + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    /// Writes one batch atomically with respect to other producers.
    ///
    /// Raw `SYN_REPORT` events are dropped since the batch gets its own.
    pub async fn emit(&self, events: &[RawEvent]) -> Result<(), SinkError> {
        let batch: Vec<RawEvent> = events
            .iter()
            .filter(|event| !event.is_sync_report())
            .copied()
            .collect();
        if batch.is_empty() {
            return Ok(());
        }

        let mut sink = self.inner.lock().await;
        sink.emit(&batch)
    }
}

/// Range of an absolute axis, copied from the physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub value: i32,
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    pub flat: i32,
    pub resolution: i32,
}

/// Event codes a device can produce.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub keys: BTreeSet<u16>,
    pub relative: BTreeSet<u16>,
    pub absolute: BTreeMap<u16, AxisRange>,
    pub misc: BTreeSet<u16>,
}

impl Capabilities {
    pub fn from_device(device: &evdev::Device) -> Self {
        let mut caps = Self::default();
        if let Some(keys) = device.supported_keys() {
            caps.keys.extend(keys.iter().map(|key| key.code()));
        }
        if let Some(axes) = device.supported_relative_axes() {
            caps.relative.extend(axes.iter().map(|axis| axis.0));
        }
        if let Some(misc) = device.misc_properties() {
            caps.misc.extend(misc.iter().map(|code| code.0));
        }
        if let (Some(axes), Ok(state)) = (device.supported_absolute_axes(), device.get_abs_state()) {
            for axis in axes.iter() {
                if let Some(info) = state.get(axis.0 as usize) {
                    caps.absolute.insert(
                        axis.0,
                        AxisRange {
                            value: info.value,
                            minimum: info.minimum,
                            maximum: info.maximum,
                            fuzz: info.fuzz,
                            flat: info.flat,
                            resolution: info.resolution,
                        },
                    );
                }
            }
        }
        caps
    }

    /// Adds everything `other` supports. The first range seen for an axis wins.
    pub fn union(&mut self, other: &Capabilities) {
        self.keys.extend(&other.keys);
        self.relative.extend(&other.relative);
        self.misc.extend(&other.misc);
        for (axis, range) in &other.absolute {
            self.absolute.entry(*axis).or_insert(*range);
        }
    }

    pub fn with_keys(mut self, keys: impl IntoIterator<Item = u16>) -> Self {
        self.keys.extend(keys);
        self
    }

    pub fn with_relative(mut self, axes: impl IntoIterator<Item = u16>) -> Self {
        self.relative.extend(axes);
        self
    }
}

/// The uinput device launchers see.
pub struct UinputSink {
    device: VirtualDevice,
    dev_nodes: Vec<PathBuf>,
}

impl UinputSink {
    pub fn create(name: &str, caps: &Capabilities) -> Result<Self, SinkError> {
        info!(
            "Creating virtual device '{}' ({} keys, {} rel, {} abs, {} misc)",
            name,
            caps.keys.len(),
            caps.relative.len(),
            caps.absolute.len(),
            caps.misc.len()
        );

        let mut keys = AttributeSet::<KeyCode>::new();
        for code in &caps.keys {
            keys.insert(KeyCode::new(*code));
        }

        let mut builder = VirtualDevice::builder()
            .map_err(SinkError::Create)?
            .name(name)
            .input_id(InputId::new(
                BusType::BUS_USB,
                VENDOR_MICROSOFT,
                PRODUCT_XBOX360,
                VERSION,
            ))
            .with_keys(&keys)
            .map_err(SinkError::Create)?;

        if !caps.relative.is_empty() {
            let mut relative = AttributeSet::<RelativeAxisCode>::new();
            for code in &caps.relative {
                relative.insert(RelativeAxisCode(*code));
            }
            builder = builder
                .with_relative_axes(&relative)
                .map_err(SinkError::Create)?;
        }

        for (code, range) in &caps.absolute {
            let setup = UinputAbsSetup::new(
                AbsoluteAxisCode(*code),
                AbsInfo::new(
                    range.value,
                    range.minimum,
                    range.maximum,
                    range.fuzz,
                    range.flat,
                    range.resolution,
                ),
            );
            builder = builder
                .with_absolute_axis(&setup)
                .map_err(SinkError::Create)?;
        }

        if !caps.misc.is_empty() {
            let mut misc = AttributeSet::<MiscCode>::new();
            for code in &caps.misc {
                misc.insert(MiscCode(*code));
            }
            builder = builder.with_msc(&misc).map_err(SinkError::Create)?;
        }

        let mut device = builder.build().map_err(SinkError::Create)?;
        let dev_nodes = match device.enumerate_dev_nodes_blocking() {
            Ok(nodes) => nodes
                .filter_map(|node| {
                    node.map_err(|e| warn!("Skipping unreadable virtual device node: {}", e))
                        .ok()
                })
                .collect(),
            Err(e) => {
                warn!("Could not list nodes of virtual device '{}': {}", name, e);
                Vec::new()
            }
        };
        info!("Virtual device '{}' created at {:?}", name, dev_nodes);
        Ok(Self { device, dev_nodes })
    }

    /// `/dev/input` nodes the kernel created for this device.
    pub fn dev_nodes(&self) -> &[PathBuf] {
        &self.dev_nodes
    }
}

impl EventSink for UinputSink {
    fn emit(&mut self, events: &[RawEvent]) -> Result<(), SinkError> {
        let events: Vec<InputEvent> = events.iter().copied().map(InputEvent::from).collect();
        debug!("Emitting {} events", events.len());
        // VirtualDevice::emit appends SYN_REPORT to the batch.
        self.device.emit(&events).map_err(SinkError::Write)
    }
}

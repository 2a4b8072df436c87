//! Physical side of the daemon: finding, owning and reading the built-in devices.
//!
//! 1. [`locator`] - Enumeration with bounded retry
//! 2. [`acquisition`] - Exclusive grab and concealment of device nodes
//! 3. [`event_collector`] - Keyboard chord translation and gamepad relay loops
//! 4. [`motion`] - Motion sensor sampling loop ([`bmi160`] driver)
//! 5. [`reaper`] - Removal of phantom device nodes
//!
//! # Architecture
//!
//! ```text
//! Keyboard ──► Translator ─┐
//! Gamepad  ──► Relay ──────┼──► SharedSink ──► virtual device
//! BMI160   ──► Sampler ────┘
//! ```
//!
//! Every loop owns its source, waits for the next event or tick and stops at
//! the next suspension point once the shared cancellation token fires.

pub mod acquisition;
pub mod bmi160;
pub mod error;
pub mod event_collector;
pub mod locator;
pub mod motion;
pub mod reaper;

pub use acquisition::{AcquiredDevice, ConcealedDeviceRecord, Concealer, ExclusiveDevice};
pub use error::{DeviceError, LoopError, SensorError};
pub use event_collector::{EventSource, GamepadRelay, KeyboardTranslator};
pub use locator::{DeviceDescriptor, DeviceLocator, EvdevEnumerator, InputEnumerator, RetryPolicy};
pub use motion::{MotionSample, MotionSampler, MotionSensor};
pub use reaper::PhantomReaper;

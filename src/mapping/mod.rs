//! Translation of raw keyboard events into logical controller buttons.
//!
//! The built-in "macro" keyboard of the handheld reports its extra buttons as
//! multi-key chords (e.g. `RIGHTCTRL + LEFTMETA + O`). This module turns those
//! chords back into single logical presses that launcher software understands.
//!
//! # Architecture
//!
//! ```text
//! RawEvent + active keys ──► ChordTranslator ──► Translation (0..2 events)
//!                               │
//!                          ChordTable (per variant, ordered rules)
//! ```
//!
//! [`chord`] holds the state machine, [`tables`] the fixed per-variant rule
//! tables. Nothing in here touches a device; the event loops in
//! [`crate::controller`] feed it.

pub mod chord;
pub mod tables;

pub use chord::{
    ChordEdge, ChordInput, ChordRule, ChordState, ChordTable, ChordTranslator, Emission,
    LogicalButton, Translation,
};

use evdev::{EventType, InputEvent, MiscCode, SynchronizationCode};
use std::time::SystemTime;

/// `EV_SYN` event type.
pub const EV_SYN: u16 = EventType::SYNCHRONIZATION.0;
/// `EV_KEY` event type.
pub const EV_KEY: u16 = EventType::KEY.0;
/// `EV_REL` event type.
pub const EV_REL: u16 = EventType::RELATIVE.0;
/// `EV_MSC` event type.
pub const EV_MSC: u16 = EventType::MISC.0;
/// `MSC_SCAN` code, reported by AT keyboards alongside every key event.
pub const MSC_SCAN: u16 = MiscCode::MSC_SCAN.0;
/// `SYN_REPORT` code.
pub const SYN_REPORT: u16 = SynchronizationCode::SYN_REPORT.0;

/// A single kernel input event, decoupled from the evdev wrapper type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub timestamp: SystemTime,
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    pub fn new(kind: u16, code: u16, value: i32) -> Self {
        Self {
            timestamp: SystemTime::now(),
            kind,
            code,
            value,
        }
    }

    pub fn key(code: u16, value: i32) -> Self {
        Self::new(EV_KEY, code, value)
    }

    /// Same timestamp as `self`, different payload. Synthetic chord output
    /// inherits the time of the raw event that triggered it.
    pub fn derive(&self, kind: u16, code: u16, value: i32) -> Self {
        Self {
            timestamp: self.timestamp,
            kind,
            code,
            value,
        }
    }

    pub fn is_sync_report(&self) -> bool {
        self.kind == EV_SYN && self.code == SYN_REPORT
    }
}

impl From<InputEvent> for RawEvent {
    fn from(event: InputEvent) -> Self {
        Self {
            timestamp: event.timestamp(),
            kind: event.event_type().0,
            code: event.code(),
            value: event.value(),
        }
    }
}

impl From<RawEvent> for InputEvent {
    fn from(event: RawEvent) -> Self {
        InputEvent::new(event.kind, event.code, event.value)
    }
}

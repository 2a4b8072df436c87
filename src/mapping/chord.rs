//! Chord detection state machine.
//!
//! A [`ChordTable`] is an ordered list of guarded rules. For every raw event
//! the translator walks the list and applies the first rule whose guard holds,
//! so two buttons sharing a member key are disambiguated purely by position in
//! the table. Reordering a table changes behaviour.
//!
//! # Per-button lifecycle
//!
//! ```text
//!             press rule fires
//!  Released ───────────────────► Pressed
//!     ▲                              │
//!     └──────────────────────────────┘
//!             release rule fires
//! ```
//!
//! A press rule is only considered while its button is released and a release
//! rule only while it is pressed, so a held chord never fires twice.

use super::{RawEvent, EV_KEY, EV_MSC, MSC_SCAN};
use std::collections::BTreeSet;
use std::fmt::{self, Display};
use tracing::{debug, info};

/// Logical buttons the handhelds expose through chords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogicalButton {
    /// On-screen keyboard toggle
    Keyboard,
    /// Screen dock toggle
    Dock,
    Escape,
    /// Quick action menu
    QuickMenu,
    Home,
}

impl Display for LogicalButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalButton::Keyboard => write!(f, "Keyboard"),
            LogicalButton::Dock => write!(f, "Dock"),
            LogicalButton::Escape => write!(f, "Escape"),
            LogicalButton::QuickMenu => write!(f, "QuickMenu"),
            LogicalButton::Home => write!(f, "Home"),
        }
    }
}

/// Direction of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChordEdge {
    Press,
    Release,
}

impl ChordEdge {
    fn value(self) -> i32 {
        match self {
            ChordEdge::Press => 1,
            ChordEdge::Release => 0,
        }
    }
}

/// Pressed/not-pressed flag per logical button. Owned by one translator loop.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChordState {
    pressed: BTreeSet<LogicalButton>,
}

impl ChordState {
    pub fn is_pressed(&self, button: LogicalButton) -> bool {
        self.pressed.contains(&button)
    }

    fn apply(&mut self, button: LogicalButton, edge: ChordEdge) {
        match edge {
            ChordEdge::Press => self.pressed.insert(button),
            ChordEdge::Release => self.pressed.remove(&button),
        };
    }
}

/// Everything a guard may look at besides the chord state.
#[derive(Debug, Clone, Copy)]
pub struct ChordInput<'a> {
    pub event: &'a RawEvent,
    /// Key codes currently held on the device, ascending.
    pub active: &'a [u16],
}

impl ChordInput<'_> {
    pub fn active_is(&self, chord: &[u16]) -> bool {
        self.active == chord
    }

    pub fn code_in(&self, codes: &[u16]) -> bool {
        codes.contains(&self.event.code)
    }

    pub fn value(&self) -> i32 {
        self.event.value
    }
}

/// What a matched rule does with the triggering event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    /// Replace the raw event with one synthetic key event per code.
    Keys(&'static [u16]),
    /// Keep the raw event; suppression still decides whether it is forwarded.
    Unchanged,
}

pub type Guard = fn(&ChordInput<'_>, &ChordState) -> bool;

#[derive(Clone, Copy)]
pub struct ChordRule {
    pub button: LogicalButton,
    pub edge: ChordEdge,
    pub guard: Guard,
    pub emission: Emission,
}

impl fmt::Debug for ChordRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChordRule")
            .field("button", &self.button)
            .field("edge", &self.edge)
            .field("emission", &self.emission)
            .finish_non_exhaustive()
    }
}

impl ChordRule {
    fn fires(&self, input: &ChordInput<'_>, state: &ChordState) -> bool {
        let pressed = state.is_pressed(self.button);
        let armed = match self.edge {
            ChordEdge::Press => !pressed,
            ChordEdge::Release => pressed,
        };
        armed && (self.guard)(input, state)
    }
}

/// Fixed translation table of one hardware family.
#[derive(Debug)]
pub struct ChordTable {
    pub name: &'static str,
    /// Evaluated in order, first match wins.
    pub rules: &'static [ChordRule],
    /// Chord member codes that never reach the sink as raw key events.
    pub suppressed: &'static [u16],
    /// Codes used both standalone and inside a chord. A press is forwarded
    /// only when no rule consumed it; repeats never are, and a release only
    /// follows a forwarded press.
    pub shared: &'static [u16],
}

impl ChordTable {
    /// Every key code the table can synthesise.
    pub fn synthetic_keys(&self) -> BTreeSet<u16> {
        self.rules
            .iter()
            .filter_map(|rule| match rule.emission {
                Emission::Keys(codes) => Some(codes),
                Emission::Unchanged => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    pub fn is_member(&self, code: u16) -> bool {
        self.suppressed.contains(&code) || self.shared.contains(&code)
    }
}

/// Output of one translation step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Translation {
    /// Events to write to the sink as one unit; empty means drop.
    pub events: Vec<RawEvent>,
    /// The rule that fired, if any.
    pub fired: Option<(LogicalButton, ChordEdge)>,
}

/// Per-keyboard chord state machine.
#[derive(Debug)]
pub struct ChordTranslator {
    table: &'static ChordTable,
    state: ChordState,
    /// Shared codes whose press reached the sink and still owe a release.
    forwarded: BTreeSet<u16>,
}

impl ChordTranslator {
    pub fn new(table: &'static ChordTable) -> Self {
        info!("Creating chord translator for {} table", table.name);
        Self {
            table,
            state: ChordState::default(),
            forwarded: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> &ChordState {
        &self.state
    }

    /// Translates one raw event given the keys held right after it.
    pub fn translate(&mut self, event: &RawEvent, active: &[u16]) -> Translation {
        let input = ChordInput { event, active };
        let rule = self
            .table
            .rules
            .iter()
            .find(|rule| rule.fires(&input, &self.state));

        let Some(rule) = rule else {
            return Translation {
                events: self.forward(event, false),
                fired: None,
            };
        };

        self.state.apply(rule.button, rule.edge);
        debug!(
            "{} {:?} on code {} value {} (active {:?})",
            rule.button, rule.edge, event.code, event.value, active
        );

        let events = match rule.emission {
            Emission::Keys(codes) => codes
                .iter()
                .map(|&code| event.derive(EV_KEY, code, rule.edge.value()))
                .collect(),
            Emission::Unchanged => self.forward(event, true),
        };

        Translation {
            events,
            fired: Some((rule.button, rule.edge)),
        }
    }

    fn forward(&mut self, event: &RawEvent, consumed: bool) -> Vec<RawEvent> {
        let suppressed = match event.kind {
            EV_MSC => event.code == MSC_SCAN,
            EV_KEY if self.table.suppressed.contains(&event.code) => true,
            EV_KEY if self.table.shared.contains(&event.code) => match event.value {
                1 if !consumed => {
                    self.forwarded.insert(event.code);
                    false
                }
                0 => !self.forwarded.remove(&event.code),
                _ => true,
            },
            _ => false,
        };
        if suppressed {
            Vec::new()
        } else {
            vec![*event]
        }
    }
}

//! Per-variant chord tables.
//!
//! Signatures are compared against the sorted active key set, so every chord
//! constant below is kept in ascending order.

use super::chord::{ChordEdge, ChordInput, ChordRule, ChordState, ChordTable, Emission, LogicalButton};
use evdev::KeyCode;

const KEY_ESC: u16 = KeyCode::KEY_ESC.0;
const KEY_O: u16 = KeyCode::KEY_O.0;
const KEY_APOSTROPHE: u16 = KeyCode::KEY_APOSTROPHE.0;
const KEY_F12: u16 = KeyCode::KEY_F12.0;
const KEY_KPENTER: u16 = KeyCode::KEY_KPENTER.0;
const KEY_RIGHTCTRL: u16 = KeyCode::KEY_RIGHTCTRL.0;
const KEY_RIGHTALT: u16 = KeyCode::KEY_RIGHTALT.0;
const KEY_LEFT: u16 = KeyCode::KEY_LEFT.0;
const KEY_DELETE: u16 = KeyCode::KEY_DELETE.0;
const KEY_LEFTMETA: u16 = KeyCode::KEY_LEFTMETA.0;
const KEY_COPY: u16 = KeyCode::KEY_COPY.0;

const MODE: &[u16] = &[KeyCode::BTN_MODE.0];
const MODE_NORTH: &[u16] = &[KeyCode::BTN_MODE.0, KeyCode::BTN_NORTH.0];
const CTRL_2: &[u16] = &[KeyCode::KEY_LEFTCTRL.0, KeyCode::KEY_2.0];

// GEN1: 2021 / Founders hardware

const GEN1_KEYBOARD: &[u16] = &[KEY_O, KEY_RIGHTCTRL, KEY_LEFTMETA];
const GEN1_KEYBOARD_HELD: &[u16] = &[KEY_RIGHTCTRL];
const GEN1_DOCK: &[u16] = &[KEY_LEFTMETA];
const GEN1_DOCK_RELEASED: &[&[u16]] = &[&[], &[KEY_O, KEY_RIGHTCTRL]];
const GEN1_QUICK_MENU: &[u16] = &[KEY_RIGHTCTRL, KEY_RIGHTALT, KEY_DELETE];

fn gen1_keyboard_press(input: &ChordInput<'_>, _: &ChordState) -> bool {
    input.active_is(GEN1_KEYBOARD) && input.value() == 1
}

fn gen1_keyboard_release(input: &ChordInput<'_>, _: &ChordState) -> bool {
    input.active_is(GEN1_KEYBOARD_HELD) && input.value() == 0
}

// Meta is also the keyboard chord's third key, so a dock press is accepted
// while that chord is down and a release is accepted once meta drops out of it.
fn gen1_dock_press(input: &ChordInput<'_>, state: &ChordState) -> bool {
    matches!(input.value(), 1 | 2)
        && (input.active_is(GEN1_DOCK)
            || (input.active_is(GEN1_KEYBOARD) && state.is_pressed(LogicalButton::Keyboard)))
}

fn gen1_dock_release(input: &ChordInput<'_>, _: &ChordState) -> bool {
    GEN1_DOCK_RELEASED.iter().any(|set| input.active_is(set))
        || (input.active_is(GEN1_DOCK) && input.code_in(GEN1_DOCK) && input.value() == 0)
}

fn gen1_escape_press(input: &ChordInput<'_>, _: &ChordState) -> bool {
    input.code_in(&[KEY_ESC]) && input.value() == 1
}

fn gen1_escape_release(input: &ChordInput<'_>, _: &ChordState) -> bool {
    input.code_in(&[KEY_ESC]) && input.value() == 0
}

fn gen1_quick_menu_press(input: &ChordInput<'_>, _: &ChordState) -> bool {
    input.active_is(GEN1_QUICK_MENU) && input.value() == 1
}

fn gen1_quick_menu_release(input: &ChordInput<'_>, _: &ChordState) -> bool {
    input.code_in(GEN1_QUICK_MENU) && input.value() == 0
}

pub static GEN1: ChordTable = ChordTable {
    name: "GEN1",
    rules: &[
        ChordRule {
            button: LogicalButton::Keyboard,
            edge: ChordEdge::Press,
            guard: gen1_keyboard_press,
            emission: Emission::Keys(MODE_NORTH),
        },
        ChordRule {
            button: LogicalButton::Keyboard,
            edge: ChordEdge::Release,
            guard: gen1_keyboard_release,
            emission: Emission::Keys(MODE_NORTH),
        },
        // TODO: emit a display-switch shortcut once one is confirmed to work
        // in the launcher; until then the dock button is only tracked.
        ChordRule {
            button: LogicalButton::Dock,
            edge: ChordEdge::Press,
            guard: gen1_dock_press,
            emission: Emission::Unchanged,
        },
        ChordRule {
            button: LogicalButton::Dock,
            edge: ChordEdge::Release,
            guard: gen1_dock_release,
            emission: Emission::Unchanged,
        },
        ChordRule {
            button: LogicalButton::Escape,
            edge: ChordEdge::Press,
            guard: gen1_escape_press,
            emission: Emission::Unchanged,
        },
        ChordRule {
            button: LogicalButton::Escape,
            edge: ChordEdge::Release,
            guard: gen1_escape_release,
            emission: Emission::Unchanged,
        },
        ChordRule {
            button: LogicalButton::QuickMenu,
            edge: ChordEdge::Press,
            guard: gen1_quick_menu_press,
            emission: Emission::Keys(CTRL_2),
        },
        ChordRule {
            button: LogicalButton::QuickMenu,
            edge: ChordEdge::Release,
            guard: gen1_quick_menu_release,
            emission: Emission::Keys(CTRL_2),
        },
    ],
    suppressed: &[KEY_O, KEY_RIGHTCTRL, KEY_RIGHTALT, KEY_DELETE],
    shared: &[KEY_LEFTMETA],
};

// GEN2: NEXT hardware

const GEN2_HOME: &[&[u16]] = &[
    &[KEY_KPENTER, KEY_LEFT, KEY_COPY],
    &[KEY_F12, KEY_RIGHTCTRL, KEY_LEFTMETA],
];
const GEN2_HOME_MEMBERS: &[u16] = &[
    KEY_F12,
    KEY_KPENTER,
    KEY_RIGHTCTRL,
    KEY_LEFT,
    KEY_LEFTMETA,
    KEY_COPY,
];
const GEN2_QUICK_MENU: &[u16] = &[KEY_APOSTROPHE, KEY_COPY];

fn gen2_home_press(input: &ChordInput<'_>, _: &ChordState) -> bool {
    GEN2_HOME.iter().any(|set| input.active_is(set)) && input.value() == 1
}

fn gen2_home_release(input: &ChordInput<'_>, _: &ChordState) -> bool {
    input.code_in(GEN2_HOME_MEMBERS) && input.value() == 0
}

fn gen2_quick_menu_press(input: &ChordInput<'_>, _: &ChordState) -> bool {
    input.active_is(GEN2_QUICK_MENU) && input.value() == 1
}

fn gen2_quick_menu_release(input: &ChordInput<'_>, _: &ChordState) -> bool {
    input.code_in(GEN2_QUICK_MENU) && input.value() == 0
}

pub static GEN2: ChordTable = ChordTable {
    name: "GEN2",
    rules: &[
        ChordRule {
            button: LogicalButton::Home,
            edge: ChordEdge::Press,
            guard: gen2_home_press,
            emission: Emission::Keys(MODE),
        },
        ChordRule {
            button: LogicalButton::Home,
            edge: ChordEdge::Release,
            guard: gen2_home_release,
            emission: Emission::Keys(MODE),
        },
        ChordRule {
            button: LogicalButton::QuickMenu,
            edge: ChordEdge::Press,
            guard: gen2_quick_menu_press,
            emission: Emission::Keys(CTRL_2),
        },
        ChordRule {
            button: LogicalButton::QuickMenu,
            edge: ChordEdge::Release,
            guard: gen2_quick_menu_release,
            emission: Emission::Keys(CTRL_2),
        },
    ],
    // No standalone meta key on this hardware; it only arrives as a chord member.
    suppressed: &[
        KEY_APOSTROPHE,
        KEY_F12,
        KEY_KPENTER,
        KEY_RIGHTCTRL,
        KEY_LEFT,
        KEY_LEFTMETA,
        KEY_COPY,
    ],
    shared: &[],
};

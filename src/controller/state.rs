//! Canonical logical controller state
//!
//! [`LogicalInputState`] is plain data with clamping mutators. It never logs and never
//! touches a device; the poller owns every write and logs on its own behalf.
//! [`SharedInputState`] is the synchronized handle passed between the loops: one mutex
//! guards the whole struct, so a reader always copies fields written by one cycle.

use super::mapping::{
    dpad_code, DpadDirection, LogicalButton, BUTTON_COUNT, DISPLAY_BUTTON_BITS,
    DPAD_WIRE_BITS, WIRE_BUTTON_BITS,
};
use crate::error::FailureKind;
use serde::Serialize;
use std::sync::{Arc, Mutex};

pub const NEUTRAL_STICK: f32 = 0.0;
pub const RELEASED_TRIGGER: f32 = -1.0;

/// Partial stick update; `None` leaves the axis untouched
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StickUpdate {
    pub left_x: Option<f32>,
    pub left_y: Option<f32>,
    pub right_x: Option<f32>,
    pub right_y: Option<f32>,
}

/// Everything one poll cycle read from the device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputUpdate {
    pub sticks: StickUpdate,
    pub left_trigger: Option<f32>,
    pub right_trigger: Option<f32>,
    /// Indexed by [`LogicalButton::index`]; `None` for buttons the device lacks
    pub buttons: [Option<bool>; BUTTON_COUNT],
    pub dpad: Option<DpadDirection>,
}

/// Snapshot handed to the display layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplaySnapshot {
    #[serde(rename = "lx")]
    pub left_stick_x: f32,
    #[serde(rename = "ly")]
    pub left_stick_y: f32,
    #[serde(rename = "rx")]
    pub right_stick_x: f32,
    #[serde(rename = "ry")]
    pub right_stick_y: f32,
    #[serde(rename = "lt")]
    pub left_trigger: f32,
    #[serde(rename = "rt")]
    pub right_trigger: f32,
    /// Display bitmask, see [`DISPLAY_BUTTON_BITS`]
    pub buttons: u32,
    pub dpad: i8,
    pub connected: bool,
}

/// Snapshot handed to the wire codec
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WireSnapshot {
    /// Wire bitmask including the D-pad bit
    pub buttons: u32,
    pub left_stick_x: f32,
    pub left_stick_y: f32,
    pub right_stick_x: f32,
    pub right_stick_y: f32,
    pub left_trigger: f32,
    pub right_trigger: f32,
}

impl WireSnapshot {
    /// Released controller: no buttons, centered sticks, released triggers
    pub const NEUTRAL: WireSnapshot = WireSnapshot {
        buttons: 0,
        left_stick_x: NEUTRAL_STICK,
        left_stick_y: NEUTRAL_STICK,
        right_stick_x: NEUTRAL_STICK,
        right_stick_y: NEUTRAL_STICK,
        left_trigger: RELEASED_TRIGGER,
        right_trigger: RELEASED_TRIGGER,
    };

    pub fn axes(&self) -> [f32; 6] {
        [
            self.left_stick_x,
            self.left_stick_y,
            self.right_stick_x,
            self.right_stick_y,
            self.left_trigger,
            self.right_trigger,
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalInputState {
    left_stick_x: f32,
    left_stick_y: f32,
    right_stick_x: f32,
    right_stick_y: f32,
    left_trigger: f32,
    right_trigger: f32,
    buttons: [bool; BUTTON_COUNT],
    dpad: Option<DpadDirection>,
    connected: bool,
}

impl Default for LogicalInputState {
    fn default() -> Self {
        Self {
            left_stick_x: NEUTRAL_STICK,
            left_stick_y: NEUTRAL_STICK,
            right_stick_x: NEUTRAL_STICK,
            right_stick_y: NEUTRAL_STICK,
            left_trigger: RELEASED_TRIGGER,
            right_trigger: RELEASED_TRIGGER,
            buttons: [false; BUTTON_COUNT],
            dpad: None,
            connected: false,
        }
    }
}

// NaN has no place in the range, keep the previous value.
fn clamp_unit(current: f32, value: f32) -> f32 {
    if value.is_nan() {
        current
    } else {
        value.clamp(-1.0, 1.0)
    }
}

impl LogicalInputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the connection flag and returns `true` if it changed.
    ///
    /// A connected → disconnected edge resets every input to neutral in the same call.
    pub fn set_connection(&mut self, connected: bool) -> bool {
        if self.connected == connected {
            return false;
        }
        self.connected = connected;
        if !connected {
            self.reset_inputs();
        }
        true
    }

    pub fn set_sticks(&mut self, update: StickUpdate) {
        if let Some(v) = update.left_x {
            self.left_stick_x = clamp_unit(self.left_stick_x, v);
        }
        if let Some(v) = update.left_y {
            self.left_stick_y = clamp_unit(self.left_stick_y, v);
        }
        if let Some(v) = update.right_x {
            self.right_stick_x = clamp_unit(self.right_stick_x, v);
        }
        if let Some(v) = update.right_y {
            self.right_stick_y = clamp_unit(self.right_stick_y, v);
        }
    }

    pub fn set_triggers(&mut self, left: Option<f32>, right: Option<f32>) {
        if let Some(v) = left {
            self.left_trigger = clamp_unit(self.left_trigger, v);
        }
        if let Some(v) = right {
            self.right_trigger = clamp_unit(self.right_trigger, v);
        }
    }

    pub fn set_button(&mut self, button: LogicalButton, pressed: bool) {
        self.buttons[button.index()] = pressed;
    }

    pub fn set_dpad(&mut self, direction: Option<DpadDirection>) {
        self.dpad = direction;
    }

    /// Applies one poll cycle worth of updates
    pub fn apply(&mut self, update: &InputUpdate) {
        self.set_sticks(update.sticks);
        self.set_triggers(update.left_trigger, update.right_trigger);
        for button in LogicalButton::ALL {
            if let Some(pressed) = update.buttons[button.index()] {
                self.set_button(button, pressed);
            }
        }
        self.set_dpad(update.dpad);
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_pressed(&self, button: LogicalButton) -> bool {
        self.buttons[button.index()]
    }

    pub fn left_stick(&self) -> (f32, f32) {
        (self.left_stick_x, self.left_stick_y)
    }

    pub fn right_stick(&self) -> (f32, f32) {
        (self.right_stick_x, self.right_stick_y)
    }

    pub fn triggers(&self) -> (f32, f32) {
        (self.left_trigger, self.right_trigger)
    }

    pub fn dpad(&self) -> Option<DpadDirection> {
        self.dpad
    }

    pub fn snapshot_for_display(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            left_stick_x: self.left_stick_x,
            left_stick_y: self.left_stick_y,
            right_stick_x: self.right_stick_x,
            right_stick_y: self.right_stick_y,
            left_trigger: self.left_trigger,
            right_trigger: self.right_trigger,
            buttons: self.mask(&DISPLAY_BUTTON_BITS),
            dpad: dpad_code(self.dpad),
            connected: self.connected,
        }
    }

    pub fn snapshot_for_wire(&self) -> WireSnapshot {
        let mut buttons = self.mask(&WIRE_BUTTON_BITS);
        if let Some(direction) = self.dpad {
            if let Some((_, bit)) = DPAD_WIRE_BITS.iter().find(|(d, _)| *d == direction) {
                buttons |= 1 << bit;
            }
        }
        WireSnapshot {
            buttons,
            left_stick_x: self.left_stick_x,
            left_stick_y: self.left_stick_y,
            right_stick_x: self.right_stick_x,
            right_stick_y: self.right_stick_y,
            left_trigger: self.left_trigger,
            right_trigger: self.right_trigger,
        }
    }

    fn mask(&self, table: &[(LogicalButton, u32)]) -> u32 {
        table
            .iter()
            .filter(|(button, _)| self.is_pressed(*button))
            .fold(0, |mask, (_, bit)| mask | (1 << bit))
    }

    fn reset_inputs(&mut self) {
        let connected = self.connected;
        *self = Self {
            connected,
            ..Self::default()
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("Input state lock poisoned by a panicked writer")]
    Poisoned,
}

impl StateError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::Encode
    }
}

/// Cloneable handle to the single shared [`LogicalInputState`]
#[derive(Debug, Clone, Default)]
pub struct SharedInputState {
    inner: Arc<Mutex<LogicalInputState>>,
}

impl SharedInputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with exclusive access; every field it writes becomes visible at once
    pub fn update<R>(&self, f: impl FnOnce(&mut LogicalInputState) -> R) -> Result<R, StateError> {
        let mut guard = self.inner.lock().map_err(|_| StateError::Poisoned)?;
        Ok(f(&mut guard))
    }

    pub fn read(&self) -> Result<LogicalInputState, StateError> {
        self.inner
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| StateError::Poisoned)
    }

    pub fn wire_snapshot(&self) -> Result<WireSnapshot, StateError> {
        self.inner
            .lock()
            .map(|guard| guard.snapshot_for_wire())
            .map_err(|_| StateError::Poisoned)
    }

    pub fn display_snapshot(&self) -> Result<DisplaySnapshot, StateError> {
        self.inner
            .lock()
            .map(|guard| guard.snapshot_for_display())
            .map_err(|_| StateError::Poisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pressed_state(buttons: &[LogicalButton]) -> LogicalInputState {
        let mut state = LogicalInputState::new();
        state.set_connection(true);
        for button in buttons {
            state.set_button(*button, true);
        }
        state
    }

    #[test]
    fn sticks_and_triggers_are_clamped() {
        let mut state = LogicalInputState::new();
        state.set_sticks(StickUpdate {
            left_x: Some(2.5),
            left_y: Some(-9.0),
            right_x: Some(0.25),
            right_y: None,
        });
        state.set_triggers(Some(3.0), Some(-4.0));

        assert_eq!(state.left_stick(), (1.0, -1.0));
        assert_eq!(state.right_stick(), (0.25, 0.0));
        assert_eq!(state.triggers(), (1.0, -1.0));
    }

    #[test]
    fn partial_updates_leave_other_fields_alone() {
        let mut state = LogicalInputState::new();
        state.set_sticks(StickUpdate {
            right_y: Some(0.5),
            ..Default::default()
        });
        state.set_triggers(None, Some(0.3));
        state.set_sticks(StickUpdate {
            left_x: Some(-0.2),
            ..Default::default()
        });

        assert_eq!(state.left_stick(), (-0.2, 0.0));
        assert_eq!(state.right_stick(), (0.0, 0.5));
        assert_eq!(state.triggers(), (-1.0, 0.3));
    }

    #[test]
    fn nan_writes_are_ignored() {
        let mut state = LogicalInputState::new();
        state.set_sticks(StickUpdate {
            left_x: Some(0.4),
            ..Default::default()
        });
        state.set_sticks(StickUpdate {
            left_x: Some(f32::NAN),
            ..Default::default()
        });
        state.set_triggers(Some(f32::NAN), None);
        assert_eq!(state.left_stick().0, 0.4);
        assert_eq!(state.triggers().0, -1.0);
    }

    #[test]
    fn disconnect_edge_resets_everything() {
        let mut state = pressed_state(&LogicalButton::ALL);
        state.set_sticks(StickUpdate {
            left_x: Some(0.7),
            left_y: Some(-0.7),
            right_x: Some(0.1),
            right_y: Some(0.9),
        });
        state.set_triggers(Some(1.0), Some(0.5));
        state.set_dpad(Some(DpadDirection::Left));

        assert!(state.set_connection(false));
        assert_eq!(state, LogicalInputState::default());
    }

    #[test]
    fn repeated_connection_values_are_not_edges() {
        let mut state = LogicalInputState::new();
        assert!(!state.set_connection(false));
        assert!(state.set_connection(true));
        state.set_button(LogicalButton::A, true);
        assert!(!state.set_connection(true));
        assert!(state.is_pressed(LogicalButton::A));
    }

    #[test]
    fn wire_mask_for_a_and_b() {
        let state = pressed_state(&[LogicalButton::A, LogicalButton::B]);
        assert_eq!(state.snapshot_for_wire().buttons, 0b1100);
    }

    #[test]
    fn wire_mask_for_dpad_up_only() {
        let mut state = LogicalInputState::new();
        state.set_dpad(Some(DpadDirection::Up));
        assert_eq!(state.snapshot_for_wire().buttons, 0x200);
    }

    #[test]
    fn display_mask_uses_its_own_table() {
        let state = pressed_state(&[LogicalButton::A, LogicalButton::Xbox]);
        let display = state.snapshot_for_display();
        assert_eq!(display.buttons, (1 << 0) | (1 << 10));
        assert_eq!(display.dpad, -1);
        assert!(display.connected);
        assert_eq!(state.snapshot_for_wire().buttons, (1 << 2) | (1 << 8));
    }

    #[test]
    fn default_state_snapshots_to_neutral() {
        let state = LogicalInputState::new();
        assert_eq!(state.snapshot_for_wire(), WireSnapshot::NEUTRAL);
    }

    #[test]
    fn apply_skips_missing_buttons() {
        let mut state = pressed_state(&[LogicalButton::RS]);
        let mut update = InputUpdate::default();
        update.buttons[LogicalButton::A.index()] = Some(true);
        update.dpad = Some(DpadDirection::Right);
        state.apply(&update);

        assert!(state.is_pressed(LogicalButton::A));
        assert!(state.is_pressed(LogicalButton::RS));
        assert_eq!(state.dpad(), Some(DpadDirection::Right));
    }

    #[test]
    fn shared_state_readers_see_whole_updates() {
        let shared = SharedInputState::new();
        shared
            .update(|state| {
                state.set_connection(true);
                state.set_button(LogicalButton::Y, true);
            })
            .expect("lock should be healthy");

        let snapshot = shared.wire_snapshot().expect("lock should be healthy");
        assert_eq!(snapshot.buttons, 1 << 1);
        assert!(shared.read().expect("lock should be healthy").is_connected());
    }
}

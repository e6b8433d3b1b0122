//! 28-byte wire packet codec
//!
//! ```text
//! offset  0   4    8    12   16   20   24   28
//!         ├───┼────┼────┼────┼────┼────┼────┤
//!         btn  lx   ly   rx   ry   lt   rt
//!         u32  f32  f32  f32  f32  f32  f32    (little-endian)
//! ```
//!
//! Encoding is pure. A snapshot that cannot be encoded is replaced by
//! [`NEUTRAL_PACKET`] and the reason is handed back so the caller can log it.
//! Decoding exists for diagnostics only.

use crate::controller::mapping::wire_bit_name;
use crate::controller::state::WireSnapshot;
use crate::error::FailureKind;
use std::fmt;

pub const PACKET_SIZE: usize = 28;

const AXIS_FIELDS: [&str; 6] = [
    "left_stick_x",
    "left_stick_y",
    "right_stick_x",
    "right_stick_y",
    "left_trigger",
    "right_trigger",
];

const _: () = assert!(PACKET_SIZE == 4 + AXIS_FIELDS.len() * 4);

pub type WirePacket = [u8; PACKET_SIZE];

/// No buttons, centered sticks, both triggers at -1.0 (`0xBF800000`)
pub const NEUTRAL_PACKET: WirePacket = [
    0x00, 0x00, 0x00, 0x00, // buttons
    0x00, 0x00, 0x00, 0x00, // lx
    0x00, 0x00, 0x00, 0x00, // ly
    0x00, 0x00, 0x00, 0x00, // rx
    0x00, 0x00, 0x00, 0x00, // ry
    0x00, 0x00, 0x80, 0xBF, // lt
    0x00, 0x00, 0x80, 0xBF, // rt
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Invalid packet size: {actual} (expected {expected})")]
    InvalidLength { actual: usize, expected: usize },

    #[error("Non-finite value in field {field}")]
    NonFinite { field: &'static str },

    #[error("Input state unreadable: {0}")]
    Unreadable(String),
}

impl CodecError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::Encode
    }
}

/// Result of encoding one snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    Exact(WirePacket),
    Fallback { packet: WirePacket, reason: CodecError },
}

impl Encoded {
    pub fn neutral(reason: CodecError) -> Self {
        Encoded::Fallback {
            packet: NEUTRAL_PACKET,
            reason,
        }
    }

    pub fn packet(&self) -> &WirePacket {
        match self {
            Encoded::Exact(packet) | Encoded::Fallback { packet, .. } => packet,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Encoded::Fallback { .. })
    }
}

pub fn encode(snapshot: &WireSnapshot) -> Encoded {
    let axes = snapshot.axes();
    if let Some(index) = axes.iter().position(|v| !v.is_finite()) {
        return Encoded::neutral(CodecError::NonFinite {
            field: AXIS_FIELDS[index],
        });
    }

    let mut packet = [0u8; PACKET_SIZE];
    packet[..4].copy_from_slice(&snapshot.buttons.to_le_bytes());
    for (chunk, value) in packet[4..].chunks_exact_mut(4).zip(axes) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
    Encoded::Exact(packet)
}

/// Structured view of a received or sent packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedPacket {
    pub buttons: u32,
    pub left_stick_x: f32,
    pub left_stick_y: f32,
    pub right_stick_x: f32,
    pub right_stick_y: f32,
    pub left_trigger: f32,
    pub right_trigger: f32,
}

impl DecodedPacket {
    pub fn pressed(&self) -> Vec<&'static str> {
        pressed_names(self.buttons)
    }

    pub fn to_snapshot(&self) -> WireSnapshot {
        WireSnapshot {
            buttons: self.buttons,
            left_stick_x: self.left_stick_x,
            left_stick_y: self.left_stick_y,
            right_stick_x: self.right_stick_x,
            right_stick_y: self.right_stick_y,
            left_trigger: self.left_trigger,
            right_trigger: self.right_trigger,
        }
    }
}

impl fmt::Display for DecodedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Buttons(mask=0x{:08X}): [{}], L=({:.2},{:.2}), R=({:.2},{:.2}), Trig=({:.2},{:.2})",
            self.buttons,
            self.pressed().join(", "),
            self.left_stick_x,
            self.left_stick_y,
            self.right_stick_x,
            self.right_stick_y,
            self.left_trigger,
            self.right_trigger
        )
    }
}

pub fn decode(bytes: &[u8]) -> Result<DecodedPacket, CodecError> {
    if bytes.len() != PACKET_SIZE {
        return Err(CodecError::InvalidLength {
            actual: bytes.len(),
            expected: PACKET_SIZE,
        });
    }

    let word = |offset: usize| {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[offset..offset + 4]);
        raw
    };
    let float = |offset: usize| f32::from_le_bytes(word(offset));

    Ok(DecodedPacket {
        buttons: u32::from_le_bytes(word(0)),
        left_stick_x: float(4),
        left_stick_y: float(8),
        right_stick_x: float(12),
        right_stick_y: float(16),
        left_trigger: float(20),
        right_trigger: float(24),
    })
}

/// Names of the asserted wire bits, lowest bit first. Reserved bits are skipped.
pub fn pressed_names(mask: u32) -> Vec<&'static str> {
    (0..u32::BITS)
        .filter(|bit| mask & (1 << bit) != 0)
        .filter_map(wire_bit_name)
        .collect()
}

pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One-line description for packet logs; never fails
pub fn describe(bytes: &[u8]) -> String {
    match decode(bytes) {
        Ok(packet) => packet.to_string(),
        Err(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::mapping::{DpadDirection, LogicalButton};
    use crate::controller::state::{LogicalInputState, StickUpdate};

    fn exact(snapshot: &WireSnapshot) -> WirePacket {
        match encode(snapshot) {
            Encoded::Exact(packet) => packet,
            Encoded::Fallback { reason, .. } => panic!("unexpected fallback: {reason}"),
        }
    }

    #[test]
    fn neutral_state_encodes_to_the_literal() {
        let packet = exact(&LogicalInputState::new().snapshot_for_wire());
        assert_eq!(packet, NEUTRAL_PACKET);
        assert_eq!(
            hex_dump(&packet),
            "00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 80 bf 00 00 80 bf"
        );
    }

    #[test]
    fn field_offsets() {
        let snapshot = WireSnapshot {
            buttons: 0x0000_400C,
            left_stick_x: 1.0,
            left_stick_y: -1.0,
            right_stick_x: 0.5,
            right_stick_y: -0.5,
            left_trigger: 0.25,
            right_trigger: -0.25,
        };
        let packet = exact(&snapshot);
        assert_eq!(&packet[0..4], &[0x0C, 0x40, 0x00, 0x00]);
        assert_eq!(&packet[4..8], &1.0f32.to_le_bytes());
        assert_eq!(&packet[8..12], &(-1.0f32).to_le_bytes());
        assert_eq!(&packet[16..20], &(-0.5f32).to_le_bytes());
        assert_eq!(&packet[24..28], &(-0.25f32).to_le_bytes());
    }

    #[test]
    fn encoding_is_deterministic() {
        let mut state = LogicalInputState::new();
        state.set_connection(true);
        state.set_button(LogicalButton::RB, true);
        state.set_sticks(StickUpdate {
            left_x: Some(0.33),
            right_y: Some(-0.71),
            ..Default::default()
        });
        let snapshot = state.snapshot_for_wire();
        assert_eq!(encode(&snapshot), encode(&snapshot));
    }

    #[test]
    fn decode_recovers_the_snapshot() {
        let mut state = LogicalInputState::new();
        state.set_connection(true);
        state.set_button(LogicalButton::A, true);
        state.set_button(LogicalButton::LS, true);
        state.set_dpad(Some(DpadDirection::Left));
        state.set_sticks(StickUpdate {
            left_x: Some(-0.123),
            left_y: Some(0.456),
            right_x: Some(0.789),
            right_y: Some(-1.0),
        });
        state.set_triggers(Some(0.1), Some(-0.9));

        let snapshot = state.snapshot_for_wire();
        let decoded = decode(&exact(&snapshot)).expect("packet should decode");
        assert_eq!(decoded.to_snapshot(), snapshot);
        assert_eq!(decoded.pressed(), vec!["A", "DpadLeft", "LS"]);
    }

    #[test]
    fn a_and_b_render_in_diagnostics() {
        let mut state = LogicalInputState::new();
        state.set_button(LogicalButton::A, true);
        state.set_button(LogicalButton::B, true);
        let packet = exact(&state.snapshot_for_wire());

        assert_eq!(
            describe(&packet),
            "Buttons(mask=0x0000000C): [A, B], L=(0.00,0.00), R=(0.00,0.00), Trig=(-1.00,-1.00)"
        );
    }

    #[test]
    fn non_finite_values_fall_back_to_neutral() {
        let snapshot = WireSnapshot {
            right_stick_x: f32::INFINITY,
            ..WireSnapshot::NEUTRAL
        };
        match encode(&snapshot) {
            Encoded::Fallback { packet, reason } => {
                assert_eq!(packet, NEUTRAL_PACKET);
                assert_eq!(
                    reason,
                    CodecError::NonFinite {
                        field: "right_stick_x"
                    }
                );
            }
            Encoded::Exact(_) => panic!("infinite axis must not be encoded"),
        }
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert_eq!(
            decode(&[0u8; 27]),
            Err(CodecError::InvalidLength {
                actual: 27,
                expected: 28
            })
        );
        assert_eq!(describe(&[1, 2, 3]), "Invalid packet size: 3 (expected 28)");
    }

    #[test]
    fn reserved_bits_have_no_names() {
        assert_eq!(pressed_names(0xFFFF_8000), Vec::<&str>::new());
        assert_eq!(pressed_names(1 << 9), vec!["DpadUp"]);
    }
}

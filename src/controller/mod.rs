//! Controller subsystem for gamepad input handling
//!
//! 1. [`backend`] - Raw device access (gilrs or a test double)
//! 2. [`mapping`] - Static raw-index and bit tables
//! 3. [`poller`] - Fixed-cadence polling and connect/disconnect edges
//! 4. [`state`] - Canonical logical state shared with the transmitter
//!
//! # Architecture
//!
//! ```text
//! Gamepad ──► Backend ──► Poller ──► SharedInputState ──► (transmitter)
//!            (RawFrame)  (mapping)   (clamped, locked)
//! ```
//!
//! The poller runs on its own thread at 180 Hz by default, independent of the
//! transmit cadence.

pub mod backend;
pub mod mapping;
pub mod poller;
pub mod state;

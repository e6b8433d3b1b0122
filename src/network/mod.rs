//! Wire side of the bridge
//!
//! [`codec`] turns a wire snapshot into the 28-byte packet, [`transmitter`] sends it
//! over UDP on its own cadence.

pub mod codec;
pub mod transmitter;

//! Gamepad to UDP bridge
//!
//! ```text
//! gamepad ─► InputPoller ─► LogicalInputState ─► Transmitter ─► codec ─► UDP
//!   180 Hz                  (shared, locked)       100 Hz
//! ```
//!
//! [`orchestrator::Orchestrator`] starts and stops both loops; status flows back to a
//! control panel through [`events`].

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod logging;
pub mod network;
pub mod orchestrator;
pub mod timing;
pub mod worker;

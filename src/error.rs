//! Failure taxonomy shared by the polling and transmit loops
//!
//! Every error type in the crate maps onto one [`FailureKind`], and every kind has
//! exactly one [`Recovery`]. The loops match on the recovery instead of swallowing
//! errors wholesale, so the retry-vs-fatal policy can be read off this file.
//!
//! ```text
//! FailureKind            Recovery
//! ───────────────────    ─────────────────────
//! DeviceAbsent        ─► Idle
//! DeviceTransient     ─► PauseAndRetry
//! SocketCreate        ─► AbortLoop
//! Send                ─► ThrottleAndContinue
//! Encode              ─► SendNeutral
//! ```

/// Category of a failure observed by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// No controller present. Expected; drives the disconnected state.
    DeviceAbsent,
    /// Reading or opening the controller failed for this cycle.
    DeviceTransient,
    /// The transmit socket could not be created or the target not resolved.
    SocketCreate,
    /// A datagram send timed out or the socket reported an error.
    Send,
    /// The logical state could not be read or encoded.
    Encode,
}

/// What the owning loop does after a failure of a given kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Nothing to do, the next cycle handles it.
    Idle,
    /// Log, pause briefly, resume the loop.
    PauseAndRetry,
    /// Log once and do not run the loop.
    AbortLoop,
    /// Log at most once per interval, downgrade status, continue on the next tick.
    ThrottleAndContinue,
    /// Replace the packet with the neutral packet and log the fallback.
    SendNeutral,
}

impl FailureKind {
    pub fn recovery(self) -> Recovery {
        match self {
            FailureKind::DeviceAbsent => Recovery::Idle,
            FailureKind::DeviceTransient => Recovery::PauseAndRetry,
            FailureKind::SocketCreate => Recovery::AbortLoop,
            FailureKind::Send => Recovery::ThrottleAndContinue,
            FailureKind::Encode => Recovery::SendNeutral,
        }
    }

    /// Whether a failure of this kind ends the loop that observed it
    pub fn is_fatal(self) -> bool {
        self.recovery() == Recovery::AbortLoop
    }
}

//! Fixed-cadence controller polling
//!
//! Each cycle the poller pumps device events, checks presence, follows the
//! connect/disconnect edge and, while connected, maps one raw frame into the shared
//! [`LogicalInputState`](super::state::LogicalInputState).
//!
//! ```text
//!               count > 0 / open ok
//!  Disconnected ───────────────────► Connected ──┐ read + map
//!       ▲                                 │   ◄───┘
//!       └──── count == 0 / device lost ───┘
//! ```

use super::backend::{BackendError, BackendFactory, DeviceInfo, GamepadBackend, RawFrame};
use super::mapping::{hat_direction, raw_axis, RAW_BUTTON_MAP};
use super::state::{InputUpdate, SharedInputState, StateError, StickUpdate};
use crate::config::ControllerConfig;
use crate::error::{FailureKind, Recovery};
use crate::events::{EventPublisher, LinkStatus, PipelineEvent};
use crate::timing::{Cadence, RateLimiter};
use crate::worker::WorkerHandle;
use std::io;
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const OPEN_ERROR_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct PollerSettings {
    pub poll_hz: u32,
    /// Stick deadzone as a fraction (0.0-1.0); triggers are not deadzoned
    pub deadzone: f32,
    /// Pause after a failed cycle
    pub error_pause: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            poll_hz: 180,
            deadzone: 0.06,
            error_pause: Duration::from_millis(100),
        }
    }
}

impl From<&ControllerConfig> for PollerSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            poll_hz: config.poll_hz,
            deadzone: config.deadzone,
            error_pause: Duration::from_millis(config.error_pause_ms),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error(transparent)]
    Device(#[from] BackendError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl PollerError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PollerError::Device(e) => e.kind(),
            // A poisoned state is not the poller's to fix; keep polling.
            PollerError::State(_) => FailureKind::DeviceTransient,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Link {
    Disconnected,
    Connected(DeviceInfo),
}

pub struct InputPoller<B: GamepadBackend> {
    backend: B,
    settings: PollerSettings,
    input: SharedInputState,
    events: EventPublisher,
    link: Link,
    open_limiter: RateLimiter,
}

impl<B: GamepadBackend> InputPoller<B> {
    pub fn new(
        backend: B,
        settings: PollerSettings,
        input: SharedInputState,
        events: EventPublisher,
    ) -> Self {
        debug!("Creating input poller with settings: {:?}", settings);
        Self {
            backend,
            settings,
            input,
            events,
            link: Link::Disconnected,
            open_limiter: RateLimiter::new(OPEN_ERROR_LOG_INTERVAL),
        }
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.link, Link::Connected(_))
    }

    /// One poll cycle
    pub fn poll_once(&mut self) -> Result<(), PollerError> {
        self.backend.pump();
        let present = self.backend.device_count() > 0;

        match (self.is_connected(), present) {
            (false, true) => self.connect()?,
            (true, false) => self.disconnect()?,
            _ => {}
        }

        if self.is_connected() {
            self.read_device()?;
        }
        Ok(())
    }

    /// Polls until `cancel` fires, then releases the device
    pub fn run(&mut self, cancel: &CancellationToken) {
        info!(
            "Input poller running at {} Hz (deadzone {})",
            self.settings.poll_hz, self.settings.deadzone
        );
        let mut cadence = Cadence::from_hz(self.settings.poll_hz);

        while !cancel.is_cancelled() {
            if let Err(e) = self.poll_once() {
                match e.kind().recovery() {
                    Recovery::Idle => debug!("Controller unavailable: {}", e),
                    _ => {
                        error!("Controller error: {}", e);
                        thread::sleep(self.settings.error_pause);
                        cadence.reset();
                        continue;
                    }
                }
            }
            cadence.wait();
        }

        self.shutdown();
        info!("Input poller stopped");
    }

    /// Closes the device and forces the shared state to disconnected
    pub fn shutdown(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!("Could not reset input state on shutdown: {}", e);
        }
    }

    fn connect(&mut self) -> Result<(), PollerError> {
        let info = match self.backend.open() {
            Ok(info) => info,
            Err(e) => {
                if self.open_limiter.should_process() {
                    error!("Failed to open controller: {}", e);
                }
                self.backend.close();
                return Ok(());
            }
        };

        info!(
            "Controller connected: {} ({} buttons, {} axes, {} hats)",
            info.name, info.buttons, info.axes, info.hats
        );
        self.link = Link::Connected(info);
        if self.input.update(|state| state.set_connection(true))? {
            self.events
                .publish(PipelineEvent::Device(LinkStatus::Connected));
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), PollerError> {
        self.backend.close();
        if let Link::Connected(info) = std::mem::replace(&mut self.link, Link::Disconnected) {
            info!("Controller disconnected: {}", info.name);
        }
        if self.input.update(|state| state.set_connection(false))? {
            self.events
                .publish(PipelineEvent::Device(LinkStatus::Disconnected));
        }
        Ok(())
    }

    fn read_device(&mut self) -> Result<(), PollerError> {
        let frame = match self.backend.read() {
            Ok(frame) => frame,
            Err(BackendError::DeviceLost) => return self.disconnect(),
            Err(e) => return Err(e.into()),
        };

        let update = map_frame(&frame, self.settings.deadzone);
        let snapshot = self.input.update(|state| {
            state.apply(&update);
            state.snapshot_for_display()
        })?;
        self.events.publish(PipelineEvent::Input(snapshot));
        Ok(())
    }
}

/// Starts the poller on its own thread. The backend is created on that thread; if
/// that fails the thread logs and exits without polling.
pub fn spawn_poller(
    factory: BackendFactory,
    settings: PollerSettings,
    input: SharedInputState,
    events: EventPublisher,
    cancel: CancellationToken,
) -> io::Result<WorkerHandle<()>> {
    WorkerHandle::spawn("input-poller", cancel, move |cancel| {
        let backend = match factory() {
            Ok(backend) => backend,
            Err(e) => {
                error!("Gamepad backend unavailable, input poller not started: {}", e);
                return;
            }
        };
        InputPoller::new(backend, settings, input, events).run(&cancel);
    })
}

/// Maps one raw frame onto a partial logical update
pub fn map_frame(frame: &RawFrame, deadzone: f32) -> InputUpdate {
    let mut update = InputUpdate::default();

    for (raw_index, pressed) in frame.buttons.iter().enumerate().take(RAW_BUTTON_MAP.len()) {
        update.buttons[RAW_BUTTON_MAP[raw_index].index()] = Some(*pressed);
    }

    let axes = &frame.axes;
    let axis = |index: usize| axes.get(index).copied();
    let stick = |value: f32| apply_deadzone(value, deadzone);
    let inverted = |index: usize| axis(index).map_or(0.0, |v| -v);

    let mut sticks = StickUpdate::default();
    if let Some(x) = axis(raw_axis::LEFT_STICK_X) {
        sticks.left_x = Some(stick(x));
        sticks.left_y = Some(stick(inverted(raw_axis::LEFT_STICK_Y)));
    }
    if let Some(x) = axis(raw_axis::RIGHT_STICK_X) {
        sticks.right_x = Some(stick(x));
        sticks.right_y = Some(stick(inverted(raw_axis::RIGHT_STICK_Y)));
    }
    update.sticks = sticks;

    let (left, right) = match axes.len() {
        n if n > raw_axis::RIGHT_TRIGGER => (
            axes[raw_axis::LEFT_TRIGGER],
            axes[raw_axis::RIGHT_TRIGGER],
        ),
        n if n > raw_axis::LEFT_TRIGGER => {
            // One combined axis: negative is the left trigger, positive the right
            let v = axes[raw_axis::LEFT_TRIGGER];
            ((-v).max(-1.0), v.max(-1.0))
        }
        _ => (-1.0, -1.0),
    };
    update.left_trigger = Some(left);
    update.right_trigger = Some(right);

    update.dpad = frame.hats.first().copied().and_then(hat_direction);
    update
}

/// Zeroes values inside the deadzone and rescales the rest to keep the full range
pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone || value == 0.0 {
        0.0
    } else {
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}

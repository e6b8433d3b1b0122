//! Gamepad device access
//!
//! The poller talks to hardware only through [`GamepadBackend`]. A backend presents the
//! device the way a joystick API does: a count of present devices and, for the open
//! device, raw button/axis/hat arrays addressed by index. [`GilrsBackend`] adapts
//! gilrs' mapped gamepad model to that raw layout.

use super::mapping::raw_axis;
use crate::error::FailureKind;
use gilrs::{Axis, Button, GamepadId, Gilrs};
use std::sync::Arc;
use tracing::{debug, info};

/// One raw reading of the open device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    pub buttons: Vec<bool>,
    /// Normalized to [-1, 1]; stick Y axes report down as positive
    pub axes: Vec<f32>,
    /// Hat positions as `(x, y)` in `{-1, 0, 1}`, up is `y = 1`
    pub hats: Vec<(i8, i8)>,
}

/// Description of an opened device, logged on connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub buttons: usize,
    pub axes: usize,
    pub hats: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Failed to initialize gamepad subsystem: {0}")]
    InitializationError(String),

    #[error("Failed to open gamepad: {0}")]
    OpenError(String),

    #[error("Gamepad is no longer available")]
    DeviceLost,

    #[error("Failed to read gamepad: {0}")]
    ReadError(String),
}

impl BackendError {
    pub fn kind(&self) -> FailureKind {
        match self {
            BackendError::DeviceLost => FailureKind::DeviceAbsent,
            _ => FailureKind::DeviceTransient,
        }
    }
}

/// Raw device access used by the poller
pub trait GamepadBackend {
    /// Processes pending device events so presence and state are current
    fn pump(&mut self);

    /// Number of devices currently present
    fn device_count(&self) -> usize;

    /// Opens the first present device
    fn open(&mut self) -> Result<DeviceInfo, BackendError>;

    /// Releases the open device, if any
    fn close(&mut self);

    /// Reads the open device
    fn read(&mut self) -> Result<RawFrame, BackendError>;
}

impl<B: GamepadBackend + ?Sized> GamepadBackend for Box<B> {
    fn pump(&mut self) {
        (**self).pump()
    }

    fn device_count(&self) -> usize {
        (**self).device_count()
    }

    fn open(&mut self) -> Result<DeviceInfo, BackendError> {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn read(&mut self) -> Result<RawFrame, BackendError> {
        (**self).read()
    }
}

/// Creates a backend on the thread that will own it
pub type BackendFactory =
    Arc<dyn Fn() -> Result<Box<dyn GamepadBackend>, BackendError> + Send + Sync>;

pub fn gilrs_factory() -> BackendFactory {
    Arc::new(|| -> Result<Box<dyn GamepadBackend>, BackendError> {
        Ok(Box::new(GilrsBackend::new()?))
    })
}

// Raw button order presented by the gilrs adapter, see `mapping::RAW_BUTTON_MAP`.
const GILRS_BUTTON_LAYOUT: [Button; 11] = [
    Button::South,
    Button::East,
    Button::West,
    Button::North,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::Select,
    Button::Start,
    Button::Mode,
    Button::LeftThumb,
    Button::RightThumb,
];

const GILRS_AXIS_COUNT: usize = 6;

/// gilrs-backed device access
pub struct GilrsBackend {
    gilrs: Gilrs,
    active_gamepad: Option<GamepadId>,
}

impl GilrsBackend {
    pub fn new() -> Result<Self, BackendError> {
        info!("Initializing gilrs controller interface");
        let gilrs = Gilrs::new().map_err(|e| BackendError::InitializationError(e.to_string()))?;
        info!("Successfully initialized gilrs");
        Ok(Self {
            gilrs,
            active_gamepad: None,
        })
    }
}

impl GamepadBackend for GilrsBackend {
    fn pump(&mut self) {
        // gilrs only updates cached gamepad state while events are drained
        while let Some(event) = self.gilrs.next_event() {
            debug!("Gamepad event: {:?}", event.event);
        }
    }

    fn device_count(&self) -> usize {
        self.gilrs.gamepads().count()
    }

    fn open(&mut self) -> Result<DeviceInfo, BackendError> {
        let (id, gamepad) = self
            .gilrs
            .gamepads()
            .next()
            .ok_or_else(|| BackendError::OpenError("no gamepad present".to_string()))?;

        let info = DeviceInfo {
            name: gamepad.name().to_string(),
            buttons: GILRS_BUTTON_LAYOUT.len(),
            axes: GILRS_AXIS_COUNT,
            hats: 1,
        };
        debug!("Opened gamepad {} ({:?})", info.name, gamepad.uuid());
        self.active_gamepad = Some(id);
        Ok(info)
    }

    fn close(&mut self) {
        if let Some(id) = self.active_gamepad.take() {
            debug!("Released gamepad {}", id);
        }
    }

    fn read(&mut self) -> Result<RawFrame, BackendError> {
        let id = self
            .active_gamepad
            .ok_or_else(|| BackendError::ReadError("no gamepad open".to_string()))?;
        let gamepad = self
            .gilrs
            .connected_gamepad(id)
            .ok_or(BackendError::DeviceLost)?;

        let buttons = GILRS_BUTTON_LAYOUT
            .iter()
            .map(|button| gamepad.is_pressed(*button))
            .collect();

        // gilrs reports triggers as analog buttons in [0, 1]
        let trigger = |button: Button| {
            gamepad
                .button_data(button)
                .map_or(-1.0, |data| data.value() * 2.0 - 1.0)
        };

        let mut axes = vec![0.0; GILRS_AXIS_COUNT];
        axes[raw_axis::LEFT_STICK_X] = gamepad.value(Axis::LeftStickX);
        axes[raw_axis::LEFT_STICK_Y] = -gamepad.value(Axis::LeftStickY);
        axes[raw_axis::LEFT_TRIGGER] = trigger(Button::LeftTrigger2);
        axes[raw_axis::RIGHT_STICK_X] = gamepad.value(Axis::RightStickX);
        axes[raw_axis::RIGHT_STICK_Y] = -gamepad.value(Axis::RightStickY);
        axes[raw_axis::RIGHT_TRIGGER] = trigger(Button::RightTrigger2);

        let pressed = |button: Button| i8::from(gamepad.is_pressed(button));
        let hat = (
            pressed(Button::DPadRight) - pressed(Button::DPadLeft),
            pressed(Button::DPadUp) - pressed(Button::DPadDown),
        );

        Ok(RawFrame {
            buttons,
            axes,
            hats: vec![hat],
        })
    }
}

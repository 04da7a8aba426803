// Joystick input for the drive loop
//
// Provides:
// - The `Joystick` contract the control loop polls once per tick
// - Axis mapping (which stick axis is forward/steer, Y inversion)
// - Deadzone + moving-average conditioning
// - Backends: gilrs gamepad (feature `gamepad`) and zenoh teleop

mod conditioner;
#[cfg(feature = "gamepad")]
pub mod gamepad;
pub mod remote;

pub use conditioner::{
    DEFAULT_DEADZONE, DEFAULT_FILTER_DEPTH, InputConditioner, MovingAverage, apply_deadzone,
};
pub use remote::{CommandWatchdog, RemoteInput};

use crate::messages::JoystickState;

/// Error types for joystick input
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("No joystick available: {0}")]
    Unavailable(String),

    #[error("Joystick backend error: {0}")]
    Backend(String),
}

/// Source of joystick snapshots
pub trait Joystick {
    /// Sample all axes and buttons. `Unavailable` means the loop should
    /// pause and probe again later.
    fn poll(&mut self) -> Result<JoystickState, InputError>;
}

impl<J: Joystick + ?Sized> Joystick for Box<J> {
    fn poll(&mut self) -> Result<JoystickState, InputError> {
        (**self).poll()
    }
}

/// Forward/steer pair in [-1, 1], produced once per tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisSample {
    pub forward: f32,
    pub steer: f32,
}

/// Which joystick axes drive the mower
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisMapping {
    pub forward_axis: usize,
    pub steer_axis: usize,
    /// Flip forward for pads that report "stick up" as negative
    pub invert_forward: bool,
}

impl AxisMapping {
    pub fn sample(&self, state: &JoystickState) -> AxisSample {
        let forward = state.axis(self.forward_axis);
        AxisSample {
            forward: if self.invert_forward { -forward } else { forward },
            steer: state.axis(self.steer_axis),
        }
    }
}

impl Default for AxisMapping {
    fn default() -> Self {
        Self {
            forward_axis: 1,
            steer_axis: 0,
            invert_forward: false,
        }
    }
}

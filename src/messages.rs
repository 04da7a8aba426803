// Message types shared by the input sources, the control loop and telemetry

use serde::{Deserialize, Serialize};

use crate::kill_switch::KillSwitchState;
use crate::motor::{LinkState, WheelSpeeds};

// Joystick snapshot: teleop publisher -> runtime, gamepad backend -> control loop
// Axes are in [-1, 1]; indices follow the backend's stable ordering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoystickState {
    #[serde(default)]
    pub axes: Vec<f32>,
    #[serde(default)]
    pub buttons: Vec<bool>,
}

impl JoystickState {
    pub fn new(axes: Vec<f32>, buttons: Vec<bool>) -> Self {
        Self { axes, buttons }
    }

    /// Axis value clamped to [-1, 1]; missing or NaN axes read as centered
    pub fn axis(&self, index: usize) -> f32 {
        match self.axes.get(index) {
            Some(v) if !v.is_nan() => v.clamp(-1.0, 1.0),
            _ => 0.0,
        }
    }

    /// Button level; missing buttons read as released
    pub fn button(&self, index: usize) -> bool {
        self.buttons.get(index).copied().unwrap_or(false)
    }
}

/// Health status published by the runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Ok,
    InputLost,
    CommandDropped,
    ShuttingDown,
}

// Status output from runtime -> telemetry subscribers, once per tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MowerStatus {
    pub speeds: WheelSpeeds,
    /// Bytes written this tick, one entry per packet
    #[serde(default)]
    pub packets: Vec<Vec<u8>>,
    pub link: LinkState,
    pub kill_switch: KillSwitchState,
    pub health: Health,
}

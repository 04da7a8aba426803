// Zero-turn differential steering for the two drive wheels.
// Converts conditioned forward/steer values into signed per-wheel speeds.

use serde::{Deserialize, Serialize};

/// Largest wheel speed magnitude the motor controllers accept (6-bit field)
pub const MAX_WHEEL_SPEED: f32 = 63.0;

/// Magnitude bits of a wheel command
pub const MAGNITUDE_MASK: u8 = 0x3F;

/// Signed wheel speeds, always within [-MAX_WHEEL_SPEED, MAX_WHEEL_SPEED]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelSpeeds {
    pub left: f32,
    pub right: f32,
}

impl WheelSpeeds {
    pub fn new(left: f32, right: f32) -> Self {
        Self {
            left: clamp_speed(left),
            right: clamp_speed(right),
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }
}

/// Speed scale and per-wheel trim applied by the mixer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixerSettings {
    pub speed_scale: f32,
    pub left_trim: f32,
    pub right_trim: f32,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            speed_scale: 70.0,
            left_trim: 0.0,
            right_trim: 0.0,
        }
    }
}

/// Wheel rotation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// Direction bit as carried on the wire (0 = forward, 1 = reverse)
    pub fn bit(self) -> u8 {
        match self {
            Direction::Forward => 0,
            Direction::Reverse => 1,
        }
    }

    pub fn from_bit(bit: u8) -> Self {
        if bit & 1 == 0 {
            Direction::Forward
        } else {
            Direction::Reverse
        }
    }
}

/// Direction and 6-bit magnitude for one wheel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelCommand {
    pub direction: Direction,
    pub magnitude: u8,
}

impl WheelCommand {
    /// Split a signed speed into direction and truncated magnitude.
    ///
    /// The speed is clamped first, so the magnitude never exceeds 63.
    pub fn from_speed(speed: f32) -> Self {
        let clamped = clamp_speed(speed);
        let direction = if clamped < 0.0 {
            Direction::Reverse
        } else {
            Direction::Forward
        };
        // `as` truncates toward zero, matching the controller's integer speeds
        let magnitude = (clamped.abs() as u8) & MAGNITUDE_MASK;
        Self {
            direction,
            magnitude,
        }
    }

    pub fn stop() -> Self {
        Self {
            direction: Direction::Forward,
            magnitude: 0,
        }
    }
}

fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        return 0.0;
    }
    speed.clamp(-MAX_WHEEL_SPEED, MAX_WHEEL_SPEED)
}

/// Mix forward/steer into left/right wheel speeds
///
/// # Arguments
/// * `forward` - Conditioned forward axis in [-1, 1] (positive = forward)
/// * `steer` - Conditioned steer axis in [-1, 1]
/// * `speed_scale` - Multiplier from axis units to wheel speed units
/// * `left_trim` / `right_trim` - Offsets added after scaling
pub fn mix(
    forward: f32,
    steer: f32,
    speed_scale: f32,
    left_trim: f32,
    right_trim: f32,
) -> WheelSpeeds {
    let left = (forward + steer) * speed_scale + left_trim;
    let right = (forward - steer) * speed_scale + right_trim;
    WheelSpeeds::new(left, right)
}

/// Mix using a settings bundle
pub fn mix_with(forward: f32, steer: f32, settings: &MixerSettings) -> WheelSpeeds {
    mix(
        forward,
        steer,
        settings.speed_scale,
        settings.left_trim,
        settings.right_trim,
    )
}

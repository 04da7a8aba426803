// Differential-drive control for a joystick-driven mower
pub mod config;
pub mod control;
pub mod error;
pub mod input;
pub mod kill_switch;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod telemetry;

pub use config::MowerConfig;
pub use control::{ControlLoop, ControlSettings, TickOutcome};
pub use error::{Error, Result};

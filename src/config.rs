// Loop timing, serial link, input mapping and actuator configuration
//
// Every value has a default, so an empty (or missing) config file yields the
// stock mower setup. Files are TOML:
//
//   [serial]
//   port = "/dev/ttyUSB0"
//   protocol = "scaled-byte"
//
//   [drive]
//   speed_scale = 60

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::input::{AxisMapping, DEFAULT_DEADZONE, DEFAULT_FILTER_DEPTH};
use crate::kill_switch::servo::{SERVO_FREQUENCY_HZ, SERVO_GPIO_PIN};
use crate::kill_switch::{DEFAULT_OFF_DUTY, DEFAULT_ON_DUTY, KillSwitchSettings};
use crate::motor::link::{DEFAULT_BAUDRATE, DEFAULT_TIMEOUT_MS};
use crate::motor::{MixerSettings, ProtocolVariant, RetryPolicy};

// Runtime loop period
pub const LOOP_PERIOD_MS: u64 = 50;

// Pause between joystick probes while no input is available
pub const INPUT_REPROBE_MS: u64 = 1000;

// Teleop command timeout for the remote-input watchdog
pub const CMD_TIMEOUT_MS: u64 = 250;

// Zenoh topics
pub const TOPIC_TELEOP: &str = "mower/cmd/joystick"; // joystick samples
pub const TOPIC_STATE: &str = "mower/state"; // status

// Serial port for the motor controller
pub const MOTOR_PORT: &str = "/dev/ttyUSB0";

// Open/reconnect retry
pub const RECONNECT_RETRIES: u32 = 5;
pub const RECONNECT_DELAY_MS: u64 = 5000;

// Joystick buttons
pub const KILL_SWITCH_BUTTON: usize = 1; // B
pub const SHUTDOWN_BUTTON: usize = 6; // View
pub const SHUTDOWN_HOLD_MS: u64 = 3000;

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Where joystick samples come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum InputSource {
    /// Local gamepad via gilrs
    #[default]
    Gamepad,
    /// `JoystickState` JSON over zenoh
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub source: InputSource,
    pub deadzone: f32,
    pub filter_depth: usize,
    pub forward_axis: usize,
    pub steer_axis: usize,
    pub invert_forward: bool,
    pub kill_switch_button: usize,
    pub shutdown_button: usize,
    pub shutdown_hold_ms: u64,
    pub command_timeout_ms: u64,
    pub teleop_topic: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        let mapping = AxisMapping::default();
        Self {
            source: InputSource::default(),
            deadzone: DEFAULT_DEADZONE,
            filter_depth: DEFAULT_FILTER_DEPTH,
            forward_axis: mapping.forward_axis,
            steer_axis: mapping.steer_axis,
            invert_forward: mapping.invert_forward,
            kill_switch_button: KILL_SWITCH_BUTTON,
            shutdown_button: SHUTDOWN_BUTTON,
            shutdown_hold_ms: SHUTDOWN_HOLD_MS,
            command_timeout_ms: CMD_TIMEOUT_MS,
            teleop_topic: TOPIC_TELEOP.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub speed_scale: i32,
    pub left_trim: i32,
    pub right_trim: i32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            speed_scale: 70,
            left_trim: 0,
            right_trim: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub protocol: ProtocolVariant,
    pub reconnect_retries: u32,
    pub reconnect_delay_ms: u64,
    pub timeout_ms: u64,
    /// Log packets instead of opening the port
    pub dry_run: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: MOTOR_PORT.to_string(),
            baud_rate: DEFAULT_BAUDRATE,
            protocol: ProtocolVariant::default(),
            reconnect_retries: RECONNECT_RETRIES,
            reconnect_delay_ms: RECONNECT_DELAY_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KillSwitchConfig {
    pub gpio_pin: u8,
    pub pwm_frequency_hz: f64,
    pub on_duty: f64,
    pub off_duty: f64,
    pub debounce_settle_ms: u64,
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        Self {
            gpio_pin: SERVO_GPIO_PIN,
            pwm_frequency_hz: SERVO_FREQUENCY_HZ,
            on_duty: DEFAULT_ON_DUTY,
            off_duty: DEFAULT_OFF_DUTY,
            debounce_settle_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub loop_period_ms: u64,
    pub input_reprobe_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            loop_period_ms: LOOP_PERIOD_MS,
            input_reprobe_ms: INPUT_REPROBE_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub state_topic: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            state_topic: TOPIC_STATE.to_string(),
        }
    }
}

/// Complete mower configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MowerConfig {
    pub input: InputConfig,
    pub drive: DriveConfig,
    pub serial: SerialConfig,
    pub kill_switch: KillSwitchConfig,
    pub runtime: RuntimeConfig,
    pub telemetry: TelemetryConfig,
}

impl MowerConfig {
    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading config from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let input = &self.input;
        if !input.deadzone.is_finite() || !(0.0..1.0).contains(&input.deadzone) {
            return Err(invalid("input.deadzone", format!("{} not in [0, 1)", input.deadzone)));
        }
        if input.filter_depth == 0 {
            return Err(invalid("input.filter_depth", "must be at least 1"));
        }
        if input.forward_axis == input.steer_axis {
            return Err(invalid(
                "input.steer_axis",
                format!("same axis as forward ({})", input.forward_axis),
            ));
        }

        let drive = &self.drive;
        if drive.speed_scale <= 0 {
            return Err(invalid("drive.speed_scale", "must be positive"));
        }

        let serial = &self.serial;
        if serial.port.trim().is_empty() {
            return Err(invalid("serial.port", "empty port name"));
        }
        if serial.baud_rate == 0 {
            return Err(invalid("serial.baud_rate", "must be non-zero"));
        }
        if serial.reconnect_retries == 0 {
            return Err(invalid("serial.reconnect_retries", "must be at least 1"));
        }

        let ks = &self.kill_switch;
        let duties = [
            ("kill_switch.on_duty", ks.on_duty),
            ("kill_switch.off_duty", ks.off_duty),
        ];
        for (field, duty) in duties {
            if !(0.0..=100.0).contains(&duty) {
                return Err(invalid(field, format!("{}% not in 0..=100", duty)));
            }
        }
        if !ks.pwm_frequency_hz.is_finite() || ks.pwm_frequency_hz <= 0.0 {
            return Err(invalid("kill_switch.pwm_frequency_hz", "must be positive"));
        }

        if self.runtime.loop_period_ms == 0 {
            return Err(invalid("runtime.loop_period_ms", "must be non-zero"));
        }
        Ok(())
    }

    pub fn axis_mapping(&self) -> AxisMapping {
        AxisMapping {
            forward_axis: self.input.forward_axis,
            steer_axis: self.input.steer_axis,
            invert_forward: self.input.invert_forward,
        }
    }

    pub fn mixer_settings(&self) -> MixerSettings {
        MixerSettings {
            speed_scale: self.drive.speed_scale as f32,
            left_trim: self.drive.left_trim as f32,
            right_trim: self.drive.right_trim as f32,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.serial.reconnect_retries,
            Duration::from_millis(self.serial.reconnect_delay_ms),
        )
    }

    pub fn kill_switch_settings(&self) -> KillSwitchSettings {
        KillSwitchSettings {
            on_duty: self.kill_switch.on_duty,
            off_duty: self.kill_switch.off_duty,
            settle: Duration::from_millis(self.kill_switch.debounce_settle_ms),
        }
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(self.runtime.loop_period_ms)
    }

    pub fn input_reprobe(&self) -> Duration {
        Duration::from_millis(self.runtime.input_reprobe_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = MowerConfig::from_toml("").unwrap();
        assert_eq!(config, MowerConfig::default());
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.drive.speed_scale, 70);
        assert_eq!(config.input.filter_depth, 3);
        assert_eq!(config.retry_policy(), RetryPolicy::new(5, Duration::from_secs(5)));
    }

    #[test]
    fn test_partial_file_overrides() {
        let config = MowerConfig::from_toml(
            r#"
            [serial]
            port = "/dev/ttyACM0"
            protocol = "scaled-byte"

            [drive]
            left_trim = -2

            [input]
            invert_forward = true
            "#,
        )
        .unwrap();
        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.serial.protocol, ProtocolVariant::ScaledByte);
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.mixer_settings().left_trim, -2.0);
        assert!(config.axis_mapping().invert_forward);
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = MowerConfig::from_toml(include_str!("../mower.toml")).unwrap();
        assert_eq!(config.serial.protocol, ProtocolVariant::PackedDirection);
        assert_eq!(config.kill_switch.on_duty, 12.5);
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let result = MowerConfig::from_toml("[serial]\nprotocol = \"smoke-signals\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            "[input]\ndeadzone = 1.5\n",
            "[input]\nfilter_depth = 0\n",
            "[serial]\nbaud_rate = 0\n",
            "[serial]\nport = \"\"\n",
            "[kill_switch]\non_duty = 150.0\n",
            "[runtime]\nloop_period_ms = 0\n",
            "[serial]\nreconnect_retries = 0\n",
        ];
        for case in cases {
            assert!(
                matches!(MowerConfig::from_toml(case), Err(ConfigError::Invalid { .. })),
                "accepted: {case}"
            );
        }
    }

    #[test]
    fn test_missing_file_reports_path() {
        let result = MowerConfig::load(Path::new("/nonexistent/mower.toml"));
        match result {
            Err(ConfigError::Read { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/mower.toml"))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}

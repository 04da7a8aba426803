// Kill switch: a joystick button toggles a servo between two positions
//
// Debouncing happens twice: only a rising edge of the button toggles, and
// after a toggle further edges are ignored until the settle delay elapses.

pub mod servo;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub use servo::{ActuatorError, LoggingServo, Servo};
#[cfg(feature = "rpi")]
pub use servo::GpioServo;

/// Servo duty cycle (%) for the armed position
pub const DEFAULT_ON_DUTY: f64 = 12.5;
/// Servo duty cycle (%) for the disarmed position
pub const DEFAULT_OFF_DUTY: f64 = 2.5;
/// Dead time after a toggle before another press is recognised
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillSwitchState {
    Armed,
    Disarmed,
}

impl KillSwitchState {
    pub fn toggled(self) -> Self {
        match self {
            KillSwitchState::Armed => KillSwitchState::Disarmed,
            KillSwitchState::Disarmed => KillSwitchState::Armed,
        }
    }
}

/// Duty-cycle setpoints and settle delay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KillSwitchSettings {
    pub on_duty: f64,
    pub off_duty: f64,
    pub settle: Duration,
}

impl KillSwitchSettings {
    pub fn duty_for(&self, state: KillSwitchState) -> f64 {
        match state {
            KillSwitchState::Armed => self.on_duty,
            KillSwitchState::Disarmed => self.off_duty,
        }
    }
}

impl Default for KillSwitchSettings {
    fn default() -> Self {
        Self {
            on_duty: DEFAULT_ON_DUTY,
            off_duty: DEFAULT_OFF_DUTY,
            settle: DEFAULT_SETTLE,
        }
    }
}

/// Rising-edge detector with a settle window after each accepted edge
#[derive(Debug, Clone)]
pub struct EdgeDebouncer {
    settle: Duration,
    last_level: bool,
    settle_until: Option<Instant>,
}

impl EdgeDebouncer {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            last_level: false,
            settle_until: None,
        }
    }

    /// Feed the current level; true when this sample is an accepted press
    pub fn sample(&mut self, level: bool, now: Instant) -> bool {
        let rising = level && !self.last_level;
        self.last_level = level;

        if !rising {
            return false;
        }
        if let Some(until) = self.settle_until {
            if now < until {
                debug!("Ignoring press during settle window");
                return false;
            }
        }
        self.settle_until = Some(now + self.settle);
        true
    }

    pub fn last_level(&self) -> bool {
        self.last_level
    }
}

/// Debounced button -> servo position state machine
pub struct KillSwitchController<S: Servo> {
    servo: S,
    settings: KillSwitchSettings,
    state: KillSwitchState,
    debouncer: EdgeDebouncer,
}

impl<S: Servo> KillSwitchController<S> {
    /// Starts `Disarmed` without moving the servo
    pub fn new(servo: S, settings: KillSwitchSettings) -> Self {
        Self {
            servo,
            settings,
            state: KillSwitchState::Disarmed,
            debouncer: EdgeDebouncer::new(settings.settle),
        }
    }

    pub fn state(&self) -> KillSwitchState {
        self.state
    }

    pub fn servo(&self) -> &S {
        &self.servo
    }

    /// Advance with this tick's button level. Returns the new state when
    /// the press toggled the switch.
    ///
    /// The state only changes once the servo accepted the new setpoint.
    pub fn update(
        &mut self,
        level: bool,
        now: Instant,
    ) -> Result<Option<KillSwitchState>, ActuatorError> {
        if !self.debouncer.sample(level, now) {
            return Ok(None);
        }

        let next = self.state.toggled();
        self.servo.set_duty_cycle(self.settings.duty_for(next))?;
        self.state = next;
        info!(
            "Kill switch {}",
            match next {
                KillSwitchState::Armed => "ON",
                KillSwitchState::Disarmed => "OFF",
            }
        );
        Ok(Some(next))
    }

    /// Release the actuator
    pub fn stop(&mut self) -> Result<(), ActuatorError> {
        self.servo.stop()
    }
}

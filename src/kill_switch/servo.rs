// Servo actuators for the physical kill switch
// A hobby servo is positioned by the duty cycle of a 50 Hz PWM signal.

use tracing::info;

/// Standard servo PWM frequency (Hz)
pub const SERVO_FREQUENCY_HZ: f64 = 50.0;

/// GPIO pin (BCM numbering) wired to the servo signal line
pub const SERVO_GPIO_PIN: u8 = 18;

/// Error types for the kill-switch actuator
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("Duty cycle {0}% outside 0..=100")]
    InvalidDuty(f64),

    #[cfg(feature = "rpi")]
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
}

/// Anything that can hold a servo at a duty-cycle setpoint
pub trait Servo {
    /// Move to `percent` duty cycle (0..=100)
    fn set_duty_cycle(&mut self, percent: f64) -> Result<(), ActuatorError>;

    /// Stop driving the servo
    fn stop(&mut self) -> Result<(), ActuatorError>;
}

impl<S: Servo + ?Sized> Servo for Box<S> {
    fn set_duty_cycle(&mut self, percent: f64) -> Result<(), ActuatorError> {
        (**self).set_duty_cycle(percent)
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        (**self).stop()
    }
}

fn check_duty(percent: f64) -> Result<(), ActuatorError> {
    if (0.0..=100.0).contains(&percent) {
        Ok(())
    } else {
        Err(ActuatorError::InvalidDuty(percent))
    }
}

/// Servo stand-in for dry runs: remembers and logs the setpoint
#[derive(Debug, Default)]
pub struct LoggingServo {
    duty: Option<f64>,
}

impl LoggingServo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current setpoint, `None` once stopped
    pub fn duty(&self) -> Option<f64> {
        self.duty
    }
}

impl Servo for LoggingServo {
    fn set_duty_cycle(&mut self, percent: f64) -> Result<(), ActuatorError> {
        check_duty(percent)?;
        info!("[dry-run] servo duty cycle -> {:.1}%", percent);
        self.duty = Some(percent);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        info!("[dry-run] servo stopped");
        self.duty = None;
        Ok(())
    }
}

/// Software PWM on a Raspberry Pi GPIO pin
#[cfg(feature = "rpi")]
pub struct GpioServo {
    pin: rppal::gpio::OutputPin,
    frequency_hz: f64,
}

#[cfg(feature = "rpi")]
impl GpioServo {
    pub fn new(pin: u8, frequency_hz: f64) -> Result<Self, ActuatorError> {
        info!("Claiming GPIO {} for kill-switch servo at {} Hz", pin, frequency_hz);
        let pin = rppal::gpio::Gpio::new()?.get(pin)?.into_output();
        Ok(Self { pin, frequency_hz })
    }
}

#[cfg(feature = "rpi")]
impl Servo for GpioServo {
    fn set_duty_cycle(&mut self, percent: f64) -> Result<(), ActuatorError> {
        check_duty(percent)?;
        tracing::debug!("Setting servo duty cycle: {}", percent);
        // rppal takes the duty cycle as a fraction
        self.pin.set_pwm_frequency(self.frequency_hz, percent / 100.0)?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        tracing::debug!("Stopping servo PWM");
        self.pin.clear_pwm()?;
        self.pin.set_low();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_servo_tracks_setpoint() {
        let mut servo = LoggingServo::new();
        servo.set_duty_cycle(12.5).unwrap();
        assert_eq!(servo.duty(), Some(12.5));
        servo.stop().unwrap();
        assert_eq!(servo.duty(), None);
    }

    #[test]
    fn test_duty_out_of_range_rejected() {
        let mut servo = LoggingServo::new();
        assert!(matches!(
            servo.set_duty_cycle(120.0),
            Err(ActuatorError::InvalidDuty(_))
        ));
        assert_eq!(servo.duty(), None);
    }
}

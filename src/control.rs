// One drive tick: joystick -> conditioner -> mixer -> encoder -> serial link,
// then the kill switch. The loop owns every component; nothing is shared.
//
// Shutdown always sends a final all-stop and releases the servo, either via
// an explicit `shutdown()` or from `Drop`.

use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::input::{AxisMapping, InputConditioner, Joystick};
use crate::kill_switch::{KillSwitchController, KillSwitchState, Servo};
use crate::motor::{
    Connector, EncodedPacket, LinkError, LinkState, MixerSettings, MotorDriver, WheelSpeeds, mix,
};

/// Button bindings and hold time for the control loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSettings {
    pub mapping: AxisMapping,
    pub mixer: MixerSettings,
    pub kill_switch_button: usize,
    pub shutdown_button: usize,
    pub shutdown_hold: Duration,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            mapping: AxisMapping::default(),
            mixer: MixerSettings::default(),
            kill_switch_button: crate::config::KILL_SWITCH_BUTTON,
            shutdown_button: crate::config::SHUTDOWN_BUTTON,
            shutdown_hold: Duration::from_millis(crate::config::SHUTDOWN_HOLD_MS),
        }
    }
}

/// Fires once a button has been held continuously for the hold time
#[derive(Debug, Clone)]
pub struct ShutdownButton {
    hold: Duration,
    pressed_since: Option<Instant>,
}

impl ShutdownButton {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            pressed_since: None,
        }
    }

    pub fn update(&mut self, pressed: bool, now: Instant) -> bool {
        if !pressed {
            if self.pressed_since.take().is_some() {
                debug!("Shutdown button released");
            }
            return false;
        }
        let since = *self.pressed_since.get_or_insert_with(|| {
            debug!("Shutdown button pressed");
            now
        });
        let held = now.saturating_duration_since(since);
        debug!("Shutdown button held for {:?}", held);
        held >= self.hold
    }
}

/// What one tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Wheel speeds encoded and written
    Sent {
        speeds: WheelSpeeds,
        packets: Vec<EncodedPacket>,
    },
    /// Write failed; link reconnected, command dropped
    Dropped { speeds: WheelSpeeds },
    /// No joystick; the caller should pause before the next tick
    InputLost,
    /// Shutdown button held long enough
    ShutdownRequested,
    /// `shutdown()` already ran; nothing was polled or sent
    Finished,
}

/// The drive pipeline plus kill switch, advanced one tick at a time
pub struct ControlLoop<J: Joystick, C: Connector, S: Servo> {
    joystick: J,
    conditioner: InputConditioner,
    driver: MotorDriver<C>,
    kill_switch: KillSwitchController<S>,
    shutdown_button: ShutdownButton,
    settings: ControlSettings,
    input_lost: bool,
    finished: bool,
}

impl<J: Joystick, C: Connector, S: Servo> ControlLoop<J, C, S> {
    pub fn new(
        joystick: J,
        conditioner: InputConditioner,
        driver: MotorDriver<C>,
        kill_switch: KillSwitchController<S>,
        settings: ControlSettings,
    ) -> Self {
        Self {
            joystick,
            conditioner,
            driver,
            kill_switch,
            shutdown_button: ShutdownButton::new(settings.shutdown_hold),
            settings,
            input_lost: false,
            finished: false,
        }
    }

    /// Send the all-stop before the first tick
    pub fn reset_motors(&mut self) -> Result<()> {
        info!("Resetting motors");
        self.driver.stop()?;
        Ok(())
    }

    /// Run one control cycle.
    ///
    /// Recoverable faults are logged and folded into the outcome; only
    /// fatal ones (`DeviceUnavailable`) come back as `Err`.
    pub fn tick(&mut self, now: Instant) -> Result<TickOutcome> {
        if self.finished {
            return Ok(TickOutcome::Finished);
        }
        let state = match self.joystick.poll() {
            Ok(state) => state,
            Err(e) => {
                if !self.input_lost {
                    warn!("Joystick input lost: {}; stopping motors", e);
                    self.input_lost = true;
                    self.conditioner.reset();
                    self.stop_motors()?;
                }
                return Ok(TickOutcome::InputLost);
            }
        };
        if self.input_lost {
            info!("Joystick input restored");
            self.input_lost = false;
        }

        if self
            .shutdown_button
            .update(state.button(self.settings.shutdown_button), now)
        {
            info!(
                "Shutdown button held for {:?}, requesting shutdown",
                self.settings.shutdown_hold
            );
            return Ok(TickOutcome::ShutdownRequested);
        }

        let axes = self.settings.mapping.sample(&state);
        debug!(
            "Joystick axis - Forward: {}, Steer: {}",
            axes.forward, axes.steer
        );
        let (forward, steer) = self.conditioner.condition(axes.forward, axes.steer);
        debug!("Moving average - Forward: {}, Steer: {}", forward, steer);

        let mixer = &self.settings.mixer;
        let speeds = mix(
            forward,
            steer,
            mixer.speed_scale,
            mixer.left_trim,
            mixer.right_trim,
        );

        let outcome = match self.driver.drive(speeds) {
            Ok(packets) => TickOutcome::Sent { speeds, packets },
            Err(e @ LinkError::TransmissionFailure { .. }) => {
                warn!("Skipping tick: {}", e);
                TickOutcome::Dropped { speeds }
            }
            Err(e) => {
                error!("Motor link lost: {}", e);
                return Err(e.into());
            }
        };

        if let Err(e) = self
            .kill_switch
            .update(state.button(self.settings.kill_switch_button), now)
        {
            warn!("Kill switch actuation failed: {}", e);
        }

        Ok(outcome)
    }

    // All-stop that tolerates a dropped command but not a dead link
    fn stop_motors(&mut self) -> Result<()> {
        match self.driver.stop() {
            Ok(()) => Ok(()),
            Err(e @ LinkError::TransmissionFailure { .. }) => {
                warn!("All-stop dropped: {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Final all-stop, then release the servo and the serial handle.
    /// Runs at most once; later calls are no-ops.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        info!("Shutting down: stopping motors and releasing actuators");

        let stopped = self.driver.stop().map_err(Error::from);
        if let Err(e) = &stopped {
            error!("Final all-stop failed: {}", e);
        }
        let released = self.kill_switch.stop().map_err(Error::from);
        if let Err(e) = &released {
            error!("Releasing kill-switch servo failed: {}", e);
        }
        self.driver.close();

        stopped.and(released)
    }

    pub fn link_state(&self) -> LinkState {
        self.driver.link_state()
    }

    pub fn kill_switch_state(&self) -> KillSwitchState {
        self.kill_switch.state()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_input_lost(&self) -> bool {
        self.input_lost
    }

    pub fn driver(&self) -> &MotorDriver<C> {
        &self.driver
    }

    pub fn kill_switch(&self) -> &KillSwitchController<S> {
        &self.kill_switch
    }
}

impl<J: Joystick, C: Connector, S: Servo> Drop for ControlLoop<J, C, S> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Shutdown on drop incomplete: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_button_needs_full_hold() {
        let start = Instant::now();
        let mut button = ShutdownButton::new(Duration::from_secs(3));
        assert!(!button.update(true, start));
        assert!(!button.update(true, start + Duration::from_millis(2900)));
        assert!(button.update(true, start + Duration::from_millis(3000)));
    }

    #[test]
    fn test_shutdown_button_release_resets() {
        let start = Instant::now();
        let mut button = ShutdownButton::new(Duration::from_secs(3));
        button.update(true, start);
        button.update(false, start + Duration::from_secs(2));
        assert!(!button.update(true, start + Duration::from_secs(4)));
        assert!(button.update(true, start + Duration::from_secs(7)));
    }
}

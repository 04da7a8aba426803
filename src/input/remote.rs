// Teleop input over zenoh
// A watchdog treats the joystick as unavailable once the latest command is
// older than the timeout, so a crashed teleop publisher stops the mower.

use std::time::{Duration, Instant};
use tracing::{debug, warn};
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::Subscriber;
use zenoh::sample::Sample;

use super::{InputError, Joystick};
use crate::messages::JoystickState;

/// Keeps the newest teleop command and its arrival time
#[derive(Debug, Clone)]
pub struct CommandWatchdog {
    timeout: Duration,
    latest: Option<(JoystickState, Instant)>,
}

impl CommandWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            latest: None,
        }
    }

    pub fn on_command(&mut self, state: JoystickState, now: Instant) {
        self.latest = Some((state, now));
    }

    /// Latest command if it is still fresh at `now`
    pub fn current(&self, now: Instant) -> Result<JoystickState, InputError> {
        match &self.latest {
            None => Err(InputError::Unavailable(
                "no teleop command received yet".to_string(),
            )),
            Some((state, received_at)) => {
                let age = now.saturating_duration_since(*received_at);
                if age > self.timeout {
                    Err(InputError::Unavailable(format!(
                        "teleop command stale ({:?} old)",
                        age
                    )))
                } else {
                    Ok(state.clone())
                }
            }
        }
    }
}

/// Joystick fed by JSON `JoystickState` samples on a zenoh topic
pub struct RemoteInput {
    subscriber: Subscriber<FifoChannelHandler<Sample>>,
    watchdog: CommandWatchdog,
}

impl RemoteInput {
    pub fn new(subscriber: Subscriber<FifoChannelHandler<Sample>>, timeout: Duration) -> Self {
        Self {
            subscriber,
            watchdog: CommandWatchdog::new(timeout),
        }
    }
}

impl Joystick for RemoteInput {
    fn poll(&mut self) -> Result<JoystickState, InputError> {
        // Drain all pending samples (non-blocking), keep latest
        while let Ok(Some(sample)) = self.subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<JoystickState>(&payload) {
                Ok(state) => {
                    debug!("Teleop command: {:?}", state);
                    self.watchdog.on_command(state, Instant::now());
                }
                Err(e) => warn!("Failed to parse teleop command: {}", e),
            }
        }
        self.watchdog.current(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_command_is_unavailable() {
        let watchdog = CommandWatchdog::new(Duration::from_millis(250));
        assert!(matches!(
            watchdog.current(Instant::now()),
            Err(InputError::Unavailable(_))
        ));
    }

    #[test]
    fn test_fresh_command_passes_through() {
        let start = Instant::now();
        let mut watchdog = CommandWatchdog::new(Duration::from_millis(250));
        let state = JoystickState::new(vec![0.0, 0.5], vec![false, true]);
        watchdog.on_command(state.clone(), start);
        let current = watchdog.current(start + Duration::from_millis(200)).unwrap();
        assert_eq!(current, state);
    }

    #[test]
    fn test_stale_command_rejected() {
        let start = Instant::now();
        let mut watchdog = CommandWatchdog::new(Duration::from_millis(250));
        watchdog.on_command(JoystickState::default(), start);
        assert!(watchdog.current(start + Duration::from_millis(300)).is_err());
    }
}

// Fixed-period drive loop with cancellation
// Single task: a blocking reconnect stalls the loop, so no command goes out
// while the link is down.

use std::time::{Duration, Instant};
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// local imports
use crate::config::{InputSource, MowerConfig};
use crate::control::{ControlLoop, ControlSettings, TickOutcome};
use crate::error::Result;
use crate::telemetry::{StatusPublisher, TelemetryError, open_session};
use crate::input::{InputConditioner, Joystick, RemoteInput};
use crate::kill_switch::{KillSwitchController, LoggingServo, Servo};
use crate::messages::{Health, MowerStatus};
use crate::motor::{
    Connector, DryRunConnector, EncodedPacket, MotorDriver, PortConnector, ProtocolEncoder,
    RetryPolicy, SerialLink, SerialPortConnector, WheelSpeeds,
};

/// Why the loop ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Cancelled,
    ShutdownRequested,
}

/// Serial connector for the configured mode
pub fn connector_for(config: &MowerConfig) -> PortConnector {
    if config.serial.dry_run {
        PortConnector::DryRun(DryRunConnector)
    } else {
        PortConnector::Hardware(SerialPortConnector::new(Duration::from_millis(
            config.serial.timeout_ms,
        )))
    }
}

/// Open the motor link and wrap it in a driver for the configured protocol
pub fn open_driver(config: &MowerConfig) -> Result<MotorDriver<PortConnector>> {
    let link = SerialLink::open(
        connector_for(config),
        &config.serial.port,
        config.serial.baud_rate,
        config.retry_policy(),
    )?;
    Ok(MotorDriver::new(
        link,
        ProtocolEncoder::new(config.serial.protocol),
    ))
}

pub fn control_settings(config: &MowerConfig) -> ControlSettings {
    ControlSettings {
        mapping: config.axis_mapping(),
        mixer: config.mixer_settings(),
        kill_switch_button: config.input.kill_switch_button,
        shutdown_button: config.input.shutdown_button,
        shutdown_hold: Duration::from_millis(config.input.shutdown_hold_ms),
    }
}

#[cfg(feature = "gamepad")]
fn open_gamepad() -> Result<Box<dyn Joystick>> {
    Ok(Box::new(crate::input::gamepad::GamepadInput::new()?))
}

#[cfg(not(feature = "gamepad"))]
fn open_gamepad() -> Result<Box<dyn Joystick>> {
    Err(crate::config::ConfigError::Invalid {
        field: "input.source",
        reason: "built without the `gamepad` feature; use `remote`".to_string(),
    }
    .into())
}

async fn open_joystick(
    config: &MowerConfig,
    session: Option<&zenoh::Session>,
) -> Result<Box<dyn Joystick>> {
    match config.input.source {
        InputSource::Gamepad => open_gamepad(),
        InputSource::Remote => {
            let session = session
                .ok_or_else(|| TelemetryError::Zenoh("no session for remote input".to_string()))?;
            let subscriber = session
                .declare_subscriber(config.input.teleop_topic.clone())
                .await
                .map_err(TelemetryError::from)?;
            info!("Subscribed to: {}", config.input.teleop_topic);
            Ok(Box::new(RemoteInput::new(
                subscriber,
                Duration::from_millis(config.input.command_timeout_ms),
            )))
        }
    }
}

#[cfg(feature = "rpi")]
fn open_servo(config: &MowerConfig) -> Result<Box<dyn Servo>> {
    if config.serial.dry_run {
        return Ok(Box::new(LoggingServo::new()));
    }
    Ok(Box::new(crate::kill_switch::GpioServo::new(
        config.kill_switch.gpio_pin,
        config.kill_switch.pwm_frequency_hz,
    )?))
}

#[cfg(not(feature = "rpi"))]
fn open_servo(config: &MowerConfig) -> Result<Box<dyn Servo>> {
    if !config.serial.dry_run {
        warn!("Built without the `rpi` feature; kill-switch servo is simulated");
    }
    Ok(Box::new(LoggingServo::new()))
}

// Telemetry is best effort: a failed publish never stops the loop
async fn publish_status(publisher: Option<&StatusPublisher>, status: MowerStatus) {
    let Some(publisher) = publisher else {
        return;
    };
    if let Err(e) = publisher.publish(&status).await {
        warn!("Failed to publish status: {}", e);
    }
}

pub async fn run(config: MowerConfig, cancel: CancellationToken) -> Result<ExitReason> {
    let needs_zenoh = config.input.source == InputSource::Remote || config.telemetry.enabled;
    let session = if needs_zenoh {
        Some(open_session().await?)
    } else {
        None
    };

    let joystick = open_joystick(&config, session.as_ref()).await?;
    let publisher = match (&session, config.telemetry.enabled) {
        (Some(session), true) => {
            Some(StatusPublisher::declare(session, &config.telemetry.state_topic).await?)
        }
        _ => None,
    };

    let driver = open_driver(&config)?;
    let kill_switch = KillSwitchController::new(open_servo(&config)?, config.kill_switch_settings());
    let conditioner = InputConditioner::new(config.input.deadzone, config.input.filter_depth);
    let mut control = ControlLoop::new(
        joystick,
        conditioner,
        driver,
        kill_switch,
        control_settings(&config),
    );
    control.reset_motors()?;

    let mut tick = interval(config.loop_period());
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Control loop started: {}ms period, {} protocol on {}",
        config.runtime.loop_period_ms, config.serial.protocol, config.serial.port
    );

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => break ExitReason::Cancelled,
            _ = tick.tick() => {}
        }

        let status = match control.tick(Instant::now()) {
            Ok(TickOutcome::Sent { speeds, packets }) => {
                status_of(&control, speeds, &packets, Health::Ok)
            }
            Ok(TickOutcome::Dropped { speeds }) => {
                status_of(&control, speeds, &[], Health::CommandDropped)
            }
            Ok(TickOutcome::InputLost) => {
                let status = status_of(&control, WheelSpeeds::zero(), &[], Health::InputLost);
                publish_status(publisher.as_ref(), status).await;
                // Pause, then probe the joystick again
                tokio::select! {
                    _ = cancel.cancelled() => break ExitReason::Cancelled,
                    _ = sleep(config.input_reprobe()) => {}
                }
                tick.reset();
                continue;
            }
            Ok(TickOutcome::ShutdownRequested) | Ok(TickOutcome::Finished) => {
                break ExitReason::ShutdownRequested;
            }
            Err(e) => {
                error!("Fatal error, stopping: {}", e);
                if let Err(stop_err) = control.shutdown() {
                    error!("Shutdown after fatal error incomplete: {}", stop_err);
                }
                return Err(e);
            }
        };
        publish_status(publisher.as_ref(), status).await;
    };

    info!("Exiting control loop: {:?}", reason);
    let status = status_of(&control, WheelSpeeds::zero(), &[], Health::ShuttingDown);
    publish_status(publisher.as_ref(), status).await;
    control.shutdown()?;
    Ok(reason)
}

fn status_of<J: Joystick, C: Connector, S: Servo>(
    control: &ControlLoop<J, C, S>,
    speeds: WheelSpeeds,
    packets: &[EncodedPacket],
    health: Health,
) -> MowerStatus {
    MowerStatus {
        speeds,
        packets: packets.iter().map(|p| p.as_bytes().to_vec()).collect(),
        link: control.link_state(),
        kill_switch: control.kill_switch_state(),
        health,
    }
}

/// Open the link, send one all-stop and close it again
pub fn stop_motors(config: &MowerConfig) -> Result<()> {
    let mut driver = open_driver(config)?;
    driver.stop()?;
    driver.close();
    Ok(())
}

/// Write a probe line and collect whatever the device answers within `wait`
pub fn probe_serial(config: &MowerConfig, probe: &[u8], wait: Duration) -> Result<Vec<u8>> {
    let mut link = SerialLink::open(
        connector_for(config),
        &config.serial.port,
        config.serial.baud_rate,
        RetryPolicy::once(),
    )?;
    info!(
        "Connected to {} at {} baud.",
        config.serial.port, config.serial.baud_rate
    );
    link.write(&EncodedPacket::from(probe.to_vec()))?;
    std::thread::sleep(wait);

    let mut reply = Vec::new();
    let mut buf = [0u8; 256];
    while link.bytes_available()? > 0 {
        let n = link.read_bytes(&mut buf)?;
        if n == 0 {
            break;
        }
        reply.extend_from_slice(&buf[..n]);
    }
    link.close();
    Ok(reply)
}

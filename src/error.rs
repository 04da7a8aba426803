// Crate-level error taxonomy

use crate::config::ConfigError;
use crate::input::InputError;
use crate::kill_switch::ActuatorError;
use crate::motor::LinkError;
use crate::telemetry::TelemetryError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Port could not be opened, even after retrying. Fatal.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(#[source] LinkError),

    /// A write failed; the link reconnected and the command was dropped.
    #[error("Transmission failure: {0}")]
    TransmissionFailure(#[source] LinkError),

    #[error("Input unavailable: {0}")]
    InputUnavailable(#[from] InputError),

    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(#[from] ConfigError),

    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the control loop can carry on after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::TransmissionFailure(_) | Error::InputUnavailable(_) | Error::Actuator(_)
        )
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::TransmissionFailure { .. } => Error::TransmissionFailure(e),
            other => Error::DeviceUnavailable(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

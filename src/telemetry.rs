// Status telemetry over zenoh
// One JSON `MowerStatus` per tick on the state topic.

use tracing::info;

use crate::messages::MowerStatus;

/// Error types for the zenoh side of the runtime
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Zenoh error: {0}")]
    Zenoh(String),

    #[error("Failed to encode status: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<zenoh::Error> for TelemetryError {
    fn from(e: zenoh::Error) -> Self {
        TelemetryError::Zenoh(e.to_string())
    }
}

pub async fn open_session() -> Result<zenoh::Session, TelemetryError> {
    info!("Opening Zenoh session...");
    Ok(zenoh::open(zenoh::Config::default()).await?)
}

pub struct StatusPublisher {
    publisher: zenoh::pubsub::Publisher<'static>,
}

impl StatusPublisher {
    pub async fn declare(session: &zenoh::Session, topic: &str) -> Result<Self, TelemetryError> {
        let publisher = session.declare_publisher(topic.to_string()).await?;
        info!("Publishing to: {}", topic);
        Ok(Self { publisher })
    }

    pub async fn publish(&self, status: &MowerStatus) -> Result<(), TelemetryError> {
        let json = serde_json::to_string(status)?;
        self.publisher.put(json).await?;
        Ok(())
    }
}

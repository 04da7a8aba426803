// Motor control module for the mower's differential drive
//
// Provides:
// - Zero-turn differential steering (forward/steer -> wheel speeds)
// - Wire encodings for the supported motor controllers
// - A serial link with bounded reconnect
// - High-level motor driver API

mod driver;
pub mod link;
pub mod mixer;
pub mod protocol;

pub use driver::MotorDriver;
pub use link::{
    Connector, DryRunConnector, LinkError, LinkState, PortConnector, RetryPolicy, SerialDevice,
    SerialLink, SerialPortConnector,
};
pub use mixer::{
    Direction, MAX_WHEEL_SPEED, MixerSettings, WheelCommand, WheelSpeeds, mix, mix_with,
};
pub use protocol::{EncodedPacket, ProtocolEncoder, ProtocolVariant};

// High-level motor driver for the mower's two drive wheels
//
// Combines the protocol encoder and the serial link to provide a simple
// API for driving and stopping the base.

use tracing::{debug, info, warn};

use super::link::{Connector, LinkError, LinkState, Result, SerialLink};
use super::mixer::WheelSpeeds;
use super::protocol::{EncodedPacket, ProtocolEncoder};

/// Drives the wheels through one controller family over one serial link
pub struct MotorDriver<C: Connector> {
    link: SerialLink<C>,
    encoder: ProtocolEncoder,
}

impl<C: Connector> MotorDriver<C> {
    pub fn new(link: SerialLink<C>, encoder: ProtocolEncoder) -> Self {
        info!(
            "Motor driver using {} protocol on {}",
            encoder.variant(),
            link.port()
        );
        Self { link, encoder }
    }

    /// Encode and send wheel speeds, returning the packets that went out.
    ///
    /// If a later frame of a multi-frame command fails after an earlier one
    /// went out, both wheels are stopped on the reconnected link so no wheel
    /// keeps a half-applied speed.
    pub fn drive(&mut self, speeds: WheelSpeeds) -> Result<Vec<EncodedPacket>> {
        let packets = self.encoder.encode(speeds);
        debug!(
            "Setting wheel speeds: left={:.1}, right={:.1} -> {:?}",
            speeds.left, speeds.right, packets
        );
        for (sent, packet) in packets.iter().enumerate() {
            if let Err(e) = self.link.write(packet) {
                if sent > 0 && matches!(e, LinkError::TransmissionFailure { .. }) {
                    warn!(
                        "Command half delivered ({} of {} frames), stopping wheels",
                        sent,
                        packets.len()
                    );
                    if let Err(stop_err) = self.link.write_all(&self.encoder.stop_packets()) {
                        warn!("Stop after partial command failed: {}", stop_err);
                    }
                }
                return Err(e);
            }
        }
        Ok(packets)
    }

    /// Stop both wheels
    pub fn stop(&mut self) -> Result<()> {
        info!("Stopping all motors");
        let packets = self.encoder.stop_packets();
        self.link.write_all(&packets)
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    pub fn link(&self) -> &SerialLink<C> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut SerialLink<C> {
        &mut self.link
    }

    pub fn encoder(&self) -> &ProtocolEncoder {
        &self.encoder
    }

    /// Release the serial handle
    pub fn close(&mut self) {
        self.link.close();
    }
}

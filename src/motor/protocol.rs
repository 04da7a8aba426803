// Motor controller wire formats
//
// Every supported controller family takes the same pair of wheel speeds and
// expects a different byte layout:
// - packed-direction: one byte per motor, [motor:1][reverse:1][speed:6]
// - dual-raw-byte:    one packet [right, left], same per-wheel layout
// - ascii:            "L{left:.2}R{right:.2}\n", "STOP\n" when idle
// - ascii-axes:       "X{turn:.2}Y{throttle:.2}\n", "STOP\n" when idle
// - scaled-byte:      [0x80, 127 + left, 127 + right] (MDDS30 style)

use serde::{Deserialize, Serialize};
use std::fmt;

use super::mixer::{Direction, MAGNITUDE_MASK, WheelCommand, WheelSpeeds};

/// Frame marker that opens a scaled-byte packet
pub const SCALED_FRAME_MARKER: u8 = 0x80;

/// Scaled-byte value meaning "stopped"
pub const SCALED_NEUTRAL: u8 = 127;

/// Sentinel sent by the ASCII variants when both wheels are stopped
pub const ASCII_STOP: &str = "STOP\n";

/// Motor channel on the packed protocols
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motor {
    Left = 0,
    Right = 1,
}

/// Direction bits (6-7) OR-ed onto the magnitude for one motor channel.
///
/// Left and right channels do not share a layout on the controller: the
/// right channel always carries bit 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectionBits {
    pub forward: u8,
    pub reverse: u8,
}

impl DirectionBits {
    pub fn for_direction(&self, direction: Direction) -> u8 {
        match direction {
            Direction::Forward => self.forward,
            Direction::Reverse => self.reverse,
        }
    }
}

pub const LEFT_DIRECTION_BITS: DirectionBits = DirectionBits {
    forward: 0x00,
    reverse: 0x40,
};

pub const RIGHT_DIRECTION_BITS: DirectionBits = DirectionBits {
    forward: 0x80,
    reverse: 0xC0,
};

/// Supported controller families, chosen once at configuration time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolVariant {
    #[default]
    PackedDirection,
    DualRawByte,
    Ascii,
    AsciiAxes,
    ScaledByte,
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolVariant::PackedDirection => "packed-direction",
            ProtocolVariant::DualRawByte => "dual-raw-byte",
            ProtocolVariant::Ascii => "ascii",
            ProtocolVariant::AsciiAxes => "ascii-axes",
            ProtocolVariant::ScaledByte => "scaled-byte",
        };
        f.write_str(name)
    }
}

/// Immutable byte sequence ready for the serial link
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedPacket(Box<[u8]>);

impl EncodedPacket {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for EncodedPacket {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into_boxed_slice())
    }
}

impl From<&str> for EncodedPacket {
    fn from(text: &str) -> Self {
        Self(Box::from(text.as_bytes()))
    }
}

impl fmt::Debug for EncodedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedPacket({:02X?})", &self.0)
    }
}

impl fmt::Display for EncodedPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Build a single-byte motor command: [motor:1][direction:1][speed:6]
pub fn motor_command(motor: Motor, direction: Direction, speed: u8) -> u8 {
    ((motor as u8) << 7) | (direction.bit() << 6) | (speed & MAGNITUDE_MASK)
}

/// Split a single-byte motor command back into its fields
pub fn decode_motor_command(byte: u8) -> (Motor, Direction, u8) {
    let motor = if byte & 0x80 == 0 {
        Motor::Left
    } else {
        Motor::Right
    };
    let direction = Direction::from_bit(byte >> 6);
    (motor, direction, byte & MAGNITUDE_MASK)
}

/// Per-wheel byte using a direction bit table
pub fn wheel_byte(command: WheelCommand, bits: DirectionBits) -> u8 {
    (command.magnitude & MAGNITUDE_MASK) | bits.for_direction(command.direction)
}

/// Remap a signed speed onto the unsigned scaled-byte range around 127
pub fn scaled_byte(speed: f32) -> u8 {
    if speed.is_nan() {
        return SCALED_NEUTRAL;
    }
    // float -> int `as` truncates toward zero and saturates
    (f32::from(SCALED_NEUTRAL) + speed).clamp(0.0, 255.0) as u8
}

/// Encodes wheel speeds for one controller family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolEncoder {
    variant: ProtocolVariant,
}

impl ProtocolEncoder {
    pub fn new(variant: ProtocolVariant) -> Self {
        Self { variant }
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Encode a pair of wheel speeds into the packets to transmit, in order
    pub fn encode(&self, speeds: WheelSpeeds) -> Vec<EncodedPacket> {
        let left = WheelCommand::from_speed(speeds.left);
        let right = WheelCommand::from_speed(speeds.right);

        match self.variant {
            ProtocolVariant::PackedDirection => vec![
                EncodedPacket::from(vec![motor_command(
                    Motor::Left,
                    left.direction,
                    left.magnitude,
                )]),
                EncodedPacket::from(vec![motor_command(
                    Motor::Right,
                    right.direction,
                    right.magnitude,
                )]),
            ],
            ProtocolVariant::DualRawByte => vec![EncodedPacket::from(vec![
                wheel_byte(right, RIGHT_DIRECTION_BITS),
                wheel_byte(left, LEFT_DIRECTION_BITS),
            ])],
            ProtocolVariant::Ascii => {
                if speeds.is_zero() {
                    vec![EncodedPacket::from(ASCII_STOP)]
                } else {
                    let text = format!("L{:.2}R{:.2}\n", speeds.left, speeds.right);
                    vec![EncodedPacket::from(text.as_str())]
                }
            }
            ProtocolVariant::AsciiAxes => {
                if speeds.is_zero() {
                    vec![EncodedPacket::from(ASCII_STOP)]
                } else {
                    // Undo the differential mix: X = turn, Y = throttle
                    let x = (speeds.left - speeds.right) / 2.0;
                    let y = (speeds.left + speeds.right) / 2.0;
                    let text = format!("X{:.2}Y{:.2}\n", x, y);
                    vec![EncodedPacket::from(text.as_str())]
                }
            }
            ProtocolVariant::ScaledByte => vec![EncodedPacket::from(vec![
                SCALED_FRAME_MARKER,
                scaled_byte(speeds.left),
                scaled_byte(speeds.right),
            ])],
        }
    }

    /// Packets that bring both wheels to a stop
    pub fn stop_packets(&self) -> Vec<EncodedPacket> {
        self.encode(WheelSpeeds::zero())
    }
}

impl Default for ProtocolEncoder {
    fn default() -> Self {
        Self::new(ProtocolVariant::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(packets: &[EncodedPacket]) -> Vec<Vec<u8>> {
        packets.iter().map(|p| p.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_motor_command_layout() {
        assert_eq!(motor_command(Motor::Left, Direction::Forward, 35), 0x23);
        assert_eq!(motor_command(Motor::Left, Direction::Reverse, 35), 0x63);
        assert_eq!(motor_command(Motor::Right, Direction::Forward, 35), 0xA3);
        assert_eq!(motor_command(Motor::Right, Direction::Reverse, 35), 0xE3);
        // Speed never leaks into the direction bits
        assert_eq!(motor_command(Motor::Left, Direction::Forward, 0xFF), 0x3F);
    }

    #[test]
    fn test_packed_matches_direction_table() {
        for speed in [-63.0, -12.0, 0.0, 12.0, 63.0] {
            let cmd = WheelCommand::from_speed(speed);
            assert_eq!(
                motor_command(Motor::Left, cmd.direction, cmd.magnitude),
                wheel_byte(cmd, LEFT_DIRECTION_BITS)
            );
            assert_eq!(
                motor_command(Motor::Right, cmd.direction, cmd.magnitude),
                wheel_byte(cmd, RIGHT_DIRECTION_BITS)
            );
        }
    }

    #[test]
    fn test_packed_direction_encoding() {
        let encoder = ProtocolEncoder::new(ProtocolVariant::PackedDirection);
        let packets = encoder.encode(WheelSpeeds::new(35.0, -20.0));
        assert_eq!(bytes(&packets), vec![vec![0x23], vec![0xC0 | 20]]);
    }

    #[test]
    fn test_dual_raw_byte_order() {
        let encoder = ProtocolEncoder::new(ProtocolVariant::DualRawByte);
        let packets = encoder.encode(WheelSpeeds::new(-10.0, 10.0));
        // Right byte first
        assert_eq!(bytes(&packets), vec![vec![0x80 | 10, 0x40 | 10]]);
    }

    #[test]
    fn test_ascii_formats() {
        let encoder = ProtocolEncoder::new(ProtocolVariant::Ascii);
        let packets = encoder.encode(WheelSpeeds::new(35.0, -12.5));
        assert_eq!(packets[0].as_bytes(), b"L35.00R-12.50\n");

        let stop = encoder.stop_packets();
        assert_eq!(stop[0].as_bytes(), b"STOP\n");

        let encoder = ProtocolEncoder::new(ProtocolVariant::AsciiAxes);
        let packets = encoder.encode(WheelSpeeds::new(30.0, 10.0));
        assert_eq!(packets[0].as_bytes(), b"X10.00Y20.00\n");
    }

    #[test]
    fn test_scaled_byte_fixed_points() {
        assert_eq!(scaled_byte(0.0), 127);
        assert_eq!(scaled_byte(63.0), 190);
        assert_eq!(scaled_byte(-63.0), 64);
        assert_eq!(scaled_byte(500.0), 255);
        assert_eq!(scaled_byte(-500.0), 0);

        let encoder = ProtocolEncoder::new(ProtocolVariant::ScaledByte);
        assert_eq!(bytes(&encoder.stop_packets()), vec![vec![0x80, 127, 127]]);
    }

    #[test]
    fn test_packet_display() {
        let packet = EncodedPacket::from(vec![0x80, 0x0A, 0xFF]);
        assert_eq!(packet.to_string(), "80 0A FF");
        assert_eq!(packet.len(), 3);
    }
}

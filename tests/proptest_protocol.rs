//! Property-based tests for the motor controller wire encodings.

use mower_drive::motor::protocol::{Motor, decode_motor_command, scaled_byte};
use mower_drive::motor::{Direction, ProtocolEncoder, ProtocolVariant, WheelSpeeds};
use proptest::prelude::*;

fn speed() -> impl Strategy<Value = f32> {
    -63.0f32..=63.0f32
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Packed-direction sends left then right, and each byte carries its
    /// motor, direction and truncated magnitude.
    #[test]
    fn prop_packed_direction_fields(left in speed(), right in speed()) {
        let packets = ProtocolEncoder::new(ProtocolVariant::PackedDirection)
            .encode(WheelSpeeds::new(left, right));
        prop_assert_eq!(packets.len(), 2);

        for (packet, motor, value) in [
            (&packets[0], Motor::Left, left),
            (&packets[1], Motor::Right, right),
        ] {
            prop_assert_eq!(packet.len(), 1);
            let (decoded_motor, direction, magnitude) = decode_motor_command(packet.as_bytes()[0]);
            prop_assert_eq!(decoded_motor, motor);
            let expected_direction = if value < 0.0 { Direction::Reverse } else { Direction::Forward };
            prop_assert_eq!(direction, expected_direction);
            prop_assert_eq!(magnitude, value.abs().trunc() as u8);
        }
    }

    /// Dual raw byte is a single two-byte frame, right wheel first.
    #[test]
    fn prop_dual_raw_byte_layout(left in speed(), right in speed()) {
        let packets = ProtocolEncoder::new(ProtocolVariant::DualRawByte)
            .encode(WheelSpeeds::new(left, right));
        prop_assert_eq!(packets.len(), 1);
        let bytes = packets[0].as_bytes();
        prop_assert_eq!(bytes.len(), 2);
        prop_assert_eq!(bytes[0] & 0x3F, right.abs().trunc() as u8);
        prop_assert_eq!(bytes[1] & 0x3F, left.abs().trunc() as u8);
        // Right wheel always carries the high bit
        prop_assert_eq!(bytes[0] & 0x80, 0x80);
        prop_assert_eq!(bytes[1] & 0x80, 0x00);
    }

    /// Scaled bytes are monotonic in speed.
    #[test]
    fn prop_scaled_byte_monotonic(a in speed(), b in speed()) {
        if a <= b {
            prop_assert!(scaled_byte(a) <= scaled_byte(b));
        }
    }

    /// Ascii frames are one newline-terminated line.
    #[test]
    fn prop_ascii_single_line(left in speed(), right in speed()) {
        for variant in [ProtocolVariant::Ascii, ProtocolVariant::AsciiAxes] {
            let packets = ProtocolEncoder::new(variant).encode(WheelSpeeds::new(left, right));
            prop_assert_eq!(packets.len(), 1);
            let text = String::from_utf8_lossy(packets[0].as_bytes()).to_string();
            prop_assert!(text.ends_with('\n'));
            prop_assert_eq!(text.matches('\n').count(), 1);
        }
    }
}

#[test]
fn test_scaled_byte_fixed_points() {
    assert_eq!(scaled_byte(0.0), 127);
    assert_eq!(scaled_byte(63.0), 190);
    assert_eq!(scaled_byte(-63.0), 64);
}

#[test]
fn test_stop_packets_per_variant() {
    let stop = |variant| -> Vec<Vec<u8>> {
        ProtocolEncoder::new(variant)
            .stop_packets()
            .iter()
            .map(|p| p.as_bytes().to_vec())
            .collect()
    };
    assert_eq!(stop(ProtocolVariant::PackedDirection), vec![vec![0x00], vec![0x80]]);
    assert_eq!(stop(ProtocolVariant::DualRawByte), vec![vec![0x80, 0x00]]);
    assert_eq!(stop(ProtocolVariant::ScaledByte), vec![vec![0x80, 127, 127]]);
    assert_eq!(stop(ProtocolVariant::Ascii), vec![b"STOP\n".to_vec()]);
    assert_eq!(stop(ProtocolVariant::AsciiAxes), vec![b"STOP\n".to_vec()]);
}

#[test]
fn test_ascii_formats_two_decimals() {
    let packets =
        ProtocolEncoder::new(ProtocolVariant::Ascii).encode(WheelSpeeds::new(35.0, -12.5));
    assert_eq!(packets[0].as_bytes(), b"L35.00R-12.50\n");

    let packets =
        ProtocolEncoder::new(ProtocolVariant::AsciiAxes).encode(WheelSpeeds::new(35.0, 15.0));
    assert_eq!(packets[0].as_bytes(), b"X10.00Y25.00\n");
}

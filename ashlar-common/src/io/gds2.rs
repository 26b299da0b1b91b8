//! GDS2 helpers: the 8-byte excess-64 floating-point format and the
//! orientation to (reflection, angle, offset) mapping used by geometry
//! writers.
//!
//! The stream float is sign bit, 7-bit excess-64 exponent and a 56-bit
//! mantissa: `value = mantissa · 16^(exp−64) · 2⁻⁵⁶`. With a mantissa
//! normalized into [1/16, 1) the encode∘decode round trip is exact to
//! within 2⁻⁵² relative.

use crate::geometry::{Coord64, Orientation, Size64};

/// Encode an IEEE double into the 8-byte stream float.
pub fn encode_real8(value: f64) -> [u8; 8] {
    if value == 0.0 || !value.is_finite() {
        return [0; 8];
    }

    let negative = value < 0.0;
    let mut magnitude = value.abs();

    // Normalize the mantissa into [1/16, 1) in steps of 16.
    let mut exponent: i32 = 64;
    while magnitude >= 1.0 {
        magnitude /= 16.0;
        exponent += 1;
    }
    while magnitude < 1.0 / 16.0 {
        magnitude *= 16.0;
        exponent -= 1;
    }
    let exponent = exponent.clamp(0, 127) as u8;

    let mantissa = (magnitude * (1u64 << 56) as f64) as u64;

    let mut out = [0u8; 8];
    out[0] = exponent | if negative { 0x80 } else { 0 };
    for (i, byte) in out.iter_mut().skip(1).enumerate() {
        *byte = ((mantissa >> (8 * (6 - i))) & 0xFF) as u8;
    }
    out
}

/// Decode the 8-byte stream float back to an IEEE double.
pub fn decode_real8(bytes: &[u8; 8]) -> f64 {
    let negative = bytes[0] & 0x80 != 0;
    let exponent = (bytes[0] & 0x7F) as i32 - 64;

    let mut mantissa: u64 = 0;
    for &byte in &bytes[1..] {
        mantissa = (mantissa << 8) | byte as u64;
    }
    if mantissa == 0 {
        return 0.0;
    }

    let value = mantissa as f64 / (1u64 << 56) as f64 * 16f64.powi(exponent);
    if negative {
        -value
    } else {
        value
    }
}

/// Stream transform of a placed instance: reflection about the x axis,
/// counter-clockwise rotation and the position offset that keeps the
/// geometry anchored at its lower-left corner.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Strans {
    pub reflect: bool,
    pub angle: f64,
    pub offset: Coord64,
}

/// Map an instance orientation onto the stream transform for a cell of
/// the given size.
pub fn orientation_strans(orientation: Orientation, size: Size64) -> Strans {
    match orientation {
        Orientation::R0 => Strans {
            reflect: false,
            angle: 0.0,
            offset: Coord64::new(0, 0),
        },
        Orientation::R90 => Strans {
            reflect: false,
            angle: 90.0,
            offset: Coord64::new(size.h, 0),
        },
        Orientation::R180 => Strans {
            reflect: false,
            angle: 180.0,
            offset: Coord64::new(size.w, size.h),
        },
        Orientation::R270 => Strans {
            reflect: false,
            angle: 270.0,
            offset: Coord64::new(0, size.w),
        },
        Orientation::MX => Strans {
            reflect: true,
            angle: 0.0,
            offset: Coord64::new(0, size.h),
        },
        Orientation::MY => Strans {
            reflect: true,
            angle: 180.0,
            offset: Coord64::new(size.w, 0),
        },
        Orientation::MX90 => Strans {
            reflect: true,
            angle: 90.0,
            offset: Coord64::new(0, 0),
        },
        Orientation::MY90 => Strans {
            reflect: true,
            angle: 270.0,
            offset: Coord64::new(size.h, size.w),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: f64) {
        let decoded = decode_real8(&encode_real8(value));
        if value == 0.0 {
            assert_eq!(decoded, 0.0);
        } else {
            let rel = ((decoded - value) / value).abs();
            assert!(
                rel <= 2f64.powi(-52),
                "round trip of {} gave {} (relative error {})",
                value,
                decoded,
                rel
            );
        }
    }

    #[test]
    fn real8_roundtrip() {
        for &value in &[
            0.0,
            1.0,
            -1.0,
            0.001,
            1e-9,
            6.25e-10,
            3.14159265358979,
            -12345.678,
            2f64.powi(40),
        ] {
            roundtrip(value);
        }
    }

    #[test]
    fn real8_known_encoding_of_one() {
        // 1.0 = (1/16) · 16^1, so exponent 65 and mantissa 2^52.
        let bytes = encode_real8(1.0);
        assert_eq!(bytes[0], 65);
        assert_eq!(bytes[1], 0x10);
        assert!(bytes[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn rotations_offset_by_cell_size() {
        let size = Size64::new(100, 40);

        let r0 = orientation_strans(Orientation::R0, size);
        assert_eq!(r0.angle, 0.0);
        assert_eq!(r0.offset, Coord64::new(0, 0));

        let r90 = orientation_strans(Orientation::R90, size);
        assert_eq!(r90.angle, 90.0);
        assert_eq!(r90.offset, Coord64::new(40, 0));

        let r180 = orientation_strans(Orientation::R180, size);
        assert_eq!(r180.angle, 180.0);
        assert_eq!(r180.offset, Coord64::new(100, 40));

        let r270 = orientation_strans(Orientation::R270, size);
        assert_eq!(r270.angle, 270.0);
        assert_eq!(r270.offset, Coord64::new(0, 100));
    }
}

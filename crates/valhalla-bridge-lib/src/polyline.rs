//! Encoded polyline codec.
//!
//! Implements the printable-ASCII polyline format used by the routing engine
//! for leg geometry. Coordinates are handled as a flat slice of alternating
//! latitude/longitude values.
//!
//! See: https://developers.google.com/maps/documentation/utilities/polylinealgorithm

use crate::error::{Error, Result};

/// Five decimal digits, the classic polyline precision.
pub const PRECISION_5: f64 = 1e5;

/// Six decimal digits, used by the engine for leg shapes.
pub const PRECISION_6: f64 = 1e6;

/// Offset added to every 5-bit group to keep it printable.
const CHAR_OFFSET: u8 = 63;

/// Set on every group except the last one of a value.
const CONTINUATION_BIT: u64 = 0x20;

const GROUP_MASK: u64 = 0x1f;

/// Scaled values must stay below this magnitude so deltas and their zigzag
/// form fit in 64 bits.
const MAX_SCALED: f64 = (1u64 << 62) as f64;

/// Encode alternating lat/lon values at [`PRECISION_5`].
pub fn encode(coords: &[f64]) -> Result<String> {
    encode_with_precision(coords, PRECISION_5)
}

/// Encode alternating lat/lon values at the given precision.
///
/// Fails with [`Error::OddCoordinateCount`] when `coords` does not hold whole
/// pairs, and with [`Error::UnencodableCoordinate`] when a value is not finite
/// or too large for 64-bit deltas at `precision`.
pub fn encode_with_precision(coords: &[f64], precision: f64) -> Result<String> {
    if coords.len() % 2 != 0 {
        return Err(Error::OddCoordinateCount { len: coords.len() });
    }

    let mut out = String::with_capacity(coords.len() * 4);
    // Previous scaled value per axis: [lat, lon]
    let mut last = [0i64; 2];
    for (index, &value) in coords.iter().enumerate() {
        let axis = index % 2;
        let unencodable = || Error::UnencodableCoordinate { index, value };
        let scaled = (value * precision).round();
        if !scaled.is_finite() || scaled.abs() >= MAX_SCALED {
            return Err(unencodable());
        }
        let scaled = scaled as i64;
        let delta = scaled.checked_sub(last[axis]).ok_or_else(unencodable)?;
        write_value(&mut out, delta).ok_or_else(unencodable)?;
        last[axis] = scaled;
    }
    Ok(out)
}

/// Decode a polyline at [`PRECISION_5`].
pub fn decode(text: &str) -> Result<Vec<f64>> {
    decode_with_precision(text, PRECISION_5)
}

/// Decode a polyline into alternating lat/lon values at the given precision.
pub fn decode_with_precision(text: &str, precision: f64) -> Result<Vec<f64>> {
    let bytes = text.as_bytes();
    let mut values = Vec::with_capacity(bytes.len() / 2);
    let mut last = [0i64; 2];
    let mut accumulator = 0u64;
    let mut shift = 0u32;

    for (position, &byte) in bytes.iter().enumerate() {
        if !(CHAR_OFFSET..=CHAR_OFFSET + 63).contains(&byte) {
            return Err(invalid(position, "character outside the polyline alphabet"));
        }
        let group = u64::from(byte - CHAR_OFFSET);
        // The group at shift 60 only has room for four payload bits.
        if shift >= u64::BITS || (shift == 60 && group & 0x10 != 0) {
            return Err(invalid(position, "value does not fit in 64 bits"));
        }

        accumulator |= (group & GROUP_MASK) << shift;
        shift += 5;

        if group & CONTINUATION_BIT == 0 {
            let axis = values.len() % 2;
            last[axis] = last[axis]
                .checked_add(unzigzag(accumulator))
                .ok_or_else(|| invalid(position, "coordinate overflow"))?;
            values.push(last[axis] as f64 / precision);
            accumulator = 0;
            shift = 0;
        }
    }

    if shift != 0 {
        return Err(invalid(bytes.len(), "truncated value"));
    }
    if values.len() % 2 != 0 {
        return Err(invalid(bytes.len(), "latitude without a longitude"));
    }
    Ok(values)
}

/// Append one zigzag-encoded delta. `None` when the delta is too large.
fn write_value(out: &mut String, delta: i64) -> Option<()> {
    let mut shifted = delta.checked_mul(2)?;
    if delta < 0 {
        shifted = !shifted;
    }

    let mut value = shifted as u64;
    while value >= CONTINUATION_BIT {
        out.push(char::from(
            ((value & GROUP_MASK) | CONTINUATION_BIT) as u8 + CHAR_OFFSET,
        ));
        value >>= 5;
    }
    out.push(char::from(value as u8 + CHAR_OFFSET));
    Some(())
}

fn unzigzag(value: u64) -> i64 {
    let magnitude = (value >> 1) as i64;
    if value & 1 != 0 {
        !magnitude
    } else {
        magnitude
    }
}

fn invalid(position: usize, reason: &str) -> Error {
    Error::InvalidPolyline {
        position,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zigzag_small_values() {
        let mut out = String::new();
        for delta in [0, -1, 1] {
            write_value(&mut out, delta).unwrap();
        }
        // 0 -> 0, -1 -> 1, 1 -> 2, each offset by 63
        assert_eq!(out, "?@A");
        assert_eq!(unzigzag(1), -1);
        assert_eq!(unzigzag(2), 1);
    }

    #[test]
    fn multi_group_value() {
        let mut out = String::new();
        write_value(&mut out, 3_850_000).unwrap();
        assert_eq!(out, "_p~iF");
    }

    #[test]
    fn deltas_beyond_zigzag_range_are_refused() {
        let mut out = String::new();
        assert!(write_value(&mut out, i64::MAX).is_none());
        assert!(write_value(&mut out, 1 << 62).is_none());
        assert!(out.is_empty());
    }
}

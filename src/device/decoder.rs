/// Decodes the first two bytes of a characteristic value as a little-endian `i16`.
///
/// Payloads shorter than two bytes decode to 0 so that a degraded notification still
/// produces a value. Bytes after the first two are ignored.
pub fn decode_i16(payload: &[u8]) -> i16 {
    match payload {
        [low, high, ..] => i16::from_le_bytes([*low, *high]),
        _ => 0,
    }
}

/// Converts integer hundredths of a degree (or any other fixed divisor) to degrees.
pub fn scale_to_degrees(raw: i16, units_per_degree: f32) -> f32 {
    raw as f32 / units_per_degree
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_little_endian() {
        assert_eq!(decode_i16(&[0xE8, 0x03]), 1000);
        assert_eq!(decode_i16(&[0x18, 0xFC]), -1000);
        assert_eq!(decode_i16(&[0xFF, 0x7F, 0xAA, 0xBB]), i16::MAX);
    }

    #[test]
    fn short_payloads_decode_to_zero() {
        assert_eq!(decode_i16(&[]), 0);
        assert_eq!(decode_i16(&[0x42]), 0);
    }

    #[test]
    fn hundredths_become_degrees() {
        assert_eq!(scale_to_degrees(4500, 100.0), 45.0);
        assert_eq!(scale_to_degrees(-1000, 100.0), -10.0);
        assert_eq!(scale_to_degrees(0, 100.0), 0.0);
    }
}

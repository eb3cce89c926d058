//! LEB128-style varints and zigzag mapping.

/// Longest encoding of a `u64`: ten 7-bit groups.
pub const MAX_VARINT_LEN: usize = 10;

/// Why a varint could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintFault {
    /// The input ended while the continuation bit was still set.
    Truncated,
    /// More than 64 significant bits.
    Overflow,
}

/// Maps signed to unsigned so small magnitudes stay short: 0, -1, 1, -2, ...
#[inline]
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Number of bytes `encode_varint` emits for `value`.
pub fn varint_len(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

pub fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a varint from the front of `data`. Returns `(value, bytes_consumed)`.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize), VarintFault> {
    let mut value: u64 = 0;
    for (i, &byte) in data.iter().enumerate().take(MAX_VARINT_LEN) {
        let group = u64::from(byte & 0x7F);
        // The tenth group carries only the top bit of a u64.
        if i == MAX_VARINT_LEN - 1 && group > 1 {
            return Err(VarintFault::Overflow);
        }
        value |= group << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    if data.len() >= MAX_VARINT_LEN {
        Err(VarintFault::Overflow)
    } else {
        Err(VarintFault::Truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_roundtrip_small() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, 42);
        assert_eq!(decode_varint(&buf), Ok((42, 1)));
    }

    #[test]
    fn varint_zero() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, 0);
        assert_eq!(buf, vec![0]);
        assert_eq!(decode_varint(&buf), Ok((0, 1)));
    }

    #[test]
    fn varint_max_u64() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, u64::MAX);
        assert_eq!(buf.len(), MAX_VARINT_LEN);
        assert_eq!(varint_len(u64::MAX), MAX_VARINT_LEN);
        assert_eq!(decode_varint(&buf), Ok((u64::MAX, MAX_VARINT_LEN)));
    }

    #[test]
    fn varint_len_matches_encoding() {
        for value in [0u64, 0x7F, 0x80, 0x3FFF, 0x4000, u64::from(u32::MAX)] {
            let mut buf = Vec::new();
            encode_varint(&mut buf, value);
            assert_eq!(buf.len(), varint_len(value), "value {value}");
        }
    }

    #[test]
    fn decode_varint_truncated() {
        assert_eq!(decode_varint(&[0x80]), Err(VarintFault::Truncated));
        assert_eq!(decode_varint(&[]), Err(VarintFault::Truncated));
    }

    #[test]
    fn decode_varint_overflow() {
        let mut bytes = [0xFFu8; 10];
        bytes[9] = 0x02;
        assert_eq!(decode_varint(&bytes), Err(VarintFault::Overflow));
        assert_eq!(decode_varint(&[0xFF; 11]), Err(VarintFault::Overflow));
    }

    #[test]
    fn zigzag_boundaries() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(i64::MAX), u64::MAX - 1);
        assert_eq!(zigzag_encode(i64::MIN), u64::MAX);
        for v in [i64::MIN, -1, 0, 1, i64::MAX] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
    }
}

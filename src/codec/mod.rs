//! Byte codec: the primitive layer every other module writes through.
//!
//! # Contract
//! - Fixed-width integers and floats are little-endian.  No negotiation.
//! - Unsigned integers may be varint packed (7-bit groups, high bit =
//!   continuation); signed integers are zigzag mapped first.  Packing is
//!   chosen per call, never inferred from the bytes.
//! - Strings are either null-terminated (table names) or varint
//!   length-prefixed (values).  Blobs are always length-prefixed.
//! - Arrays of fixed-width elements are bulk-copied behind a varint count,
//!   with no per-element framing.
//! - Pointer-sized integers are always persisted as 64 bits and narrowed
//!   with a checked conversion on read.
//!
//! # Bounds
//! [`ByteReader`] is a cursor over a window of a larger buffer.  Every read
//! checks the bytes left in the window first and fails with
//! [`CodecError::OutOfBounds`] instead of reading past it.

mod reader;
mod varint;
mod writer;

pub use reader::ByteReader;
pub use varint::{decode_varint, encode_varint, varint_len, zigzag_decode, zigzag_encode, VarintFault, MAX_VARINT_LEN};
pub use writer::{ByteWriter, Reservation};

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("read of {wanted} byte(s) at offset {offset} runs past bound {bound}")]
    OutOfBounds { offset: u64, wanted: u64, bound: u64 },
    #[error("varint at offset {offset} does not fit in 64 bits")]
    VarintOverflow { offset: u64 },
    #[error("value {value} does not fit in {target}")]
    Narrowing { value: String, target: &'static str },
    #[error("invalid {what} encoding at offset {offset}")]
    InvalidEncoding { offset: u64, what: &'static str },
    #[error("string at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: u64 },
    #[error("string at offset {offset} has no terminator")]
    Unterminated { offset: u64 },
    #[error("string {0:?} contains an interior NUL and cannot be null-terminated")]
    InteriorNul(String),
    #[error("reserved slot at offset {offset} holds {reserved} byte(s), got {actual}")]
    ReservationMismatch { offset: u64, reserved: usize, actual: usize },
    #[error("range {start}..{end} lies outside a buffer of {len} byte(s)")]
    RangeOutOfBuffer { start: u64, end: u64, len: u64 },
}

pub type CodecResult<T> = Result<T, CodecError>;

// ── Fixed-width elements ────────────────────────────────────────────────────

/// A fixed-width element that can be bulk-copied without per-element framing.
pub trait Pod: Copy + Default + 'static {
    const WIDTH: usize;
    /// Rust type name, used in narrowing and shape diagnostics.
    const NAME: &'static str;

    /// `dst.len()` is exactly `src.len() * WIDTH`.
    fn write_slice(src: &[Self], dst: &mut [u8]);
    /// `src.len()` is exactly `dst.len() * WIDTH`.
    fn read_slice(src: &[u8], dst: &mut [Self]);
}

impl Pod for u8 {
    const WIDTH: usize = 1;
    const NAME: &'static str = "u8";
    fn write_slice(src: &[Self], dst: &mut [u8]) { dst.copy_from_slice(src) }
    fn read_slice(src: &[u8], dst: &mut [Self])  { dst.copy_from_slice(src) }
}

impl Pod for i8 {
    const WIDTH: usize = 1;
    const NAME: &'static str = "i8";
    fn write_slice(src: &[Self], dst: &mut [u8]) {
        for (d, s) in dst.iter_mut().zip(src) { *d = *s as u8; }
    }
    fn read_slice(src: &[u8], dst: &mut [Self]) {
        for (d, s) in dst.iter_mut().zip(src) { *d = *s as i8; }
    }
}

macro_rules! pod_le {
    ($ty:ty, $width:expr, $write:ident, $read:ident) => {
        impl Pod for $ty {
            const WIDTH: usize = $width;
            const NAME: &'static str = stringify!($ty);
            fn write_slice(src: &[Self], dst: &mut [u8]) { LittleEndian::$write(src, dst) }
            fn read_slice(src: &[u8], dst: &mut [Self])  { LittleEndian::$read(src, dst) }
        }
    };
}

pod_le!(u16, 2, write_u16_into, read_u16_into);
pod_le!(u32, 4, write_u32_into, read_u32_into);
pod_le!(u64, 8, write_u64_into, read_u64_into);
pod_le!(i16, 2, write_i16_into, read_i16_into);
pod_le!(i32, 4, write_i32_into, read_i32_into);
pod_le!(i64, 8, write_i64_into, read_i64_into);
pod_le!(f32, 4, write_f32_into, read_f32_into);
pod_le!(f64, 8, write_f64_into, read_f64_into);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_is_little_endian() {
        let mut w = ByteWriter::new();
        w.write_u32(0x0102_0304);
        w.write_i16(-2);
        assert_eq!(w.as_slice(), &[0x04, 0x03, 0x02, 0x01, 0xFE, 0xFF]);
    }

    #[test]
    fn read_past_window_is_rejected() {
        let data = [1u8, 2, 3, 4, 5, 6];
        let mut r = ByteReader::window(&data, 2..4).unwrap();
        assert_eq!(r.read_u16().unwrap(), 0x0403);
        let err = r.read_u8().unwrap_err();
        assert_eq!(err, CodecError::OutOfBounds { offset: 4, wanted: 1, bound: 4 });
    }

    #[test]
    fn window_outside_buffer_is_rejected() {
        let data = [0u8; 4];
        assert!(matches!(
            ByteReader::window(&data, 2..9),
            Err(CodecError::RangeOutOfBuffer { .. })
        ));
    }

    #[test]
    fn strings_roundtrip() {
        let mut w = ByteWriter::new();
        w.write_cstr("shapes::Circle").unwrap();
        w.write_string("with\0nul");
        let mut r = ByteReader::new(w.as_slice());
        assert_eq!(r.read_cstr().unwrap(), "shapes::Circle");
        assert_eq!(r.read_string().unwrap(), "with\0nul");
        assert!(r.is_empty());
    }

    #[test]
    fn cstr_rejects_interior_nul() {
        let mut w = ByteWriter::new();
        assert!(matches!(w.write_cstr("a\0b"), Err(CodecError::InteriorNul(_))));
        assert!(w.is_empty());
    }

    #[test]
    fn unterminated_cstr_is_an_error() {
        let mut r = ByteReader::new(b"abc");
        assert_eq!(r.read_cstr().unwrap_err(), CodecError::Unterminated { offset: 0 });
    }

    #[test]
    fn pod_slice_bulk_copy() {
        let values = [1.5f64, -0.25, f64::MAX];
        let mut w = ByteWriter::new();
        w.write_pod_slice(&values);
        assert_eq!(w.len(), 1 + 3 * 8);
        let mut r = ByteReader::new(w.as_slice());
        assert_eq!(r.read_pod_vec::<f64>().unwrap(), values.to_vec());
    }

    #[test]
    fn pod_count_larger_than_window_fails_before_allocating() {
        let mut w = ByteWriter::new();
        w.write_uvarint(u64::MAX / 2);
        w.write_u32(7);
        let mut r = ByteReader::new(w.as_slice());
        assert!(matches!(r.read_pod_vec::<u32>(), Err(CodecError::OutOfBounds { .. })));
    }

    #[test]
    fn usize_persists_at_64_bits() {
        let mut w = ByteWriter::new();
        w.write_usize(usize::MAX, false);
        assert_eq!(w.len(), 8);
        let mut r = ByteReader::new(w.as_slice());
        assert_eq!(r.read_usize(false).unwrap(), usize::MAX);
    }

    #[test]
    fn narrowing_overflow_is_reported() {
        let mut w = ByteWriter::new();
        w.write_uvarint(u64::from(u32::MAX) + 1);
        let mut r = ByteReader::new(w.as_slice());
        let err = r.read_unsigned::<u32>(true).unwrap_err();
        assert!(matches!(err, CodecError::Narrowing { target: "u32", .. }));
    }

    #[test]
    fn backpatch_and_splice() {
        let mut w = ByteWriter::new();
        let slot = w.reserve(4);
        w.write_raw(b"body");
        w.insert_at(4, &[0xAA]).unwrap();
        w.fill(slot, &[1, 2, 3, 4]).unwrap();
        assert_eq!(w.as_slice(), &[1, 2, 3, 4, 0xAA, b'b', b'o', b'd', b'y']);
        w.overwrite_at(5, b"B").unwrap();
        assert_eq!(&w.as_slice()[5..], b"Body");
    }

    #[test]
    fn reservation_size_must_match() {
        let mut w = ByteWriter::new();
        let slot = w.reserve(3);
        let err = w.fill(slot, &[1, 2]).unwrap_err();
        assert_eq!(err, CodecError::ReservationMismatch { offset: 0, reserved: 3, actual: 2 });
    }

    #[test]
    fn overwrite_past_end_is_rejected() {
        let mut w = ByteWriter::new();
        w.write_raw(&[0; 4]);
        assert!(w.overwrite_at(3, &[1, 2]).is_err());
        assert!(w.insert_at(5, &[1]).is_err());
    }
}

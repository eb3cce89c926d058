use byteorder::{ByteOrder, LittleEndian};

use super::varint::{encode_varint, zigzag_encode};
use super::{CodecError, CodecResult, Pod};

/// A placeholder written by [`ByteWriter::reserve`], to be filled later with
/// content of exactly the same size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub offset: usize,
    pub len:    usize,
}

/// Append-only byte buffer that also supports the three rewrite patterns the
/// archive writer needs:
///
/// - [`overwrite_at`](Self::overwrite_at): constant-offset overwrite, no shifting.
/// - [`insert_at`](Self::insert_at): splice bytes in front of already-written
///   content, shifting it right.
/// - [`reserve`](Self::reserve) / [`fill`](Self::fill): write a dummy of the
///   final size now, overwrite it later; a size mismatch is an error.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

macro_rules! write_fixed {
    ($($name:ident: $ty:ty => $width:expr, $put:ident;)*) => {
        $(
            #[inline]
            pub fn $name(&mut self, value: $ty) {
                let mut bytes = [0u8; $width];
                LittleEndian::$put(&mut bytes, value);
                self.buf.extend_from_slice(&bytes);
            }
        )*
    };
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize { self.buf.len() }
    pub fn is_empty(&self) -> bool { self.buf.is_empty() }
    pub fn as_slice(&self) -> &[u8] { &self.buf }
    pub fn into_inner(self) -> Vec<u8> { self.buf }

    // ── Fixed width ─────────────────────────────────────────────────────────

    pub fn write_u8(&mut self, value: u8) { self.buf.push(value) }
    pub fn write_i8(&mut self, value: i8) { self.buf.push(value as u8) }
    pub fn write_bool(&mut self, value: bool) { self.buf.push(u8::from(value)) }

    write_fixed! {
        write_u16: u16 => 2, write_u16;
        write_u32: u32 => 4, write_u32;
        write_u64: u64 => 8, write_u64;
        write_i16: i16 => 2, write_i16;
        write_i32: i32 => 4, write_i32;
        write_i64: i64 => 8, write_i64;
        write_f32: f32 => 4, write_f32;
        write_f64: f64 => 8, write_f64;
    }

    pub fn write_pod<T: Pod>(&mut self, value: T) {
        let start = self.buf.len();
        self.buf.resize(start + T::WIDTH, 0);
        T::write_slice(&[value], &mut self.buf[start..]);
    }

    // ── Variable width ──────────────────────────────────────────────────────

    /// Unsigned integer of type `T`: varint when `packed`, else `T::WIDTH` bytes.
    pub fn write_unsigned<T: Pod + Into<u64>>(&mut self, value: T, packed: bool) {
        if packed {
            self.write_uvarint(value.into())
        } else {
            self.write_pod(value)
        }
    }

    /// Signed integer of type `T`: zigzag varint when `packed`, else fixed.
    pub fn write_signed<T: Pod + Into<i64>>(&mut self, value: T, packed: bool) {
        if packed {
            self.write_ivarint(value.into())
        } else {
            self.write_pod(value)
        }
    }

    pub fn write_uvarint(&mut self, value: u64) {
        encode_varint(&mut self.buf, value);
    }

    pub fn write_ivarint(&mut self, value: i64) {
        encode_varint(&mut self.buf, zigzag_encode(value));
    }

    /// Pointer-sized values are always persisted as 64 bits.
    pub fn write_usize(&mut self, value: usize, packed: bool) {
        if packed {
            self.write_uvarint(value as u64)
        } else {
            self.write_u64(value as u64)
        }
    }

    pub fn write_isize(&mut self, value: isize, packed: bool) {
        if packed {
            self.write_ivarint(value as i64)
        } else {
            self.write_i64(value as i64)
        }
    }

    // ── Strings and blobs ───────────────────────────────────────────────────

    /// Payload followed by a single `0x00`.
    pub fn write_cstr(&mut self, value: &str) -> CodecResult<()> {
        if value.as_bytes().contains(&0) {
            return Err(CodecError::InteriorNul(value.to_owned()));
        }
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
        Ok(())
    }

    /// Varint byte length followed by the UTF-8 payload.
    pub fn write_string(&mut self, value: &str) {
        self.write_blob(value.as_bytes());
    }

    pub fn write_blob(&mut self, value: &[u8]) {
        self.write_uvarint(value.len() as u64);
        self.buf.extend_from_slice(value);
    }

    pub fn write_raw(&mut self, value: &[u8]) {
        self.buf.extend_from_slice(value);
    }

    /// Varint element count followed by the elements, bulk-copied.
    pub fn write_pod_slice<T: Pod>(&mut self, items: &[T]) {
        self.write_uvarint(items.len() as u64);
        let start = self.buf.len();
        self.buf.resize(start + items.len() * T::WIDTH, 0);
        T::write_slice(items, &mut self.buf[start..]);
    }

    // ── Rewrites ────────────────────────────────────────────────────────────

    /// Overwrite `bytes.len()` bytes at `offset` in place.
    pub fn overwrite_at(&mut self, offset: usize, bytes: &[u8]) -> CodecResult<()> {
        let end = offset.checked_add(bytes.len()).filter(|&end| end <= self.buf.len());
        match end {
            Some(end) => {
                self.buf[offset..end].copy_from_slice(bytes);
                Ok(())
            }
            None => Err(CodecError::RangeOutOfBuffer {
                start: offset as u64,
                end:   offset as u64 + bytes.len() as u64,
                len:   self.buf.len() as u64,
            }),
        }
    }

    /// Insert `bytes` at `offset`, shifting everything after it.
    pub fn insert_at(&mut self, offset: usize, bytes: &[u8]) -> CodecResult<()> {
        if offset > self.buf.len() {
            return Err(CodecError::RangeOutOfBuffer {
                start: offset as u64,
                end:   offset as u64,
                len:   self.buf.len() as u64,
            });
        }
        self.buf.splice(offset..offset, bytes.iter().copied());
        Ok(())
    }

    /// Append `len` zero bytes to be replaced later by [`fill`](Self::fill).
    pub fn reserve(&mut self, len: usize) -> Reservation {
        let offset = self.buf.len();
        self.buf.resize(offset + len, 0);
        Reservation { offset, len }
    }

    pub fn fill(&mut self, slot: Reservation, bytes: &[u8]) -> CodecResult<()> {
        if bytes.len() != slot.len {
            return Err(CodecError::ReservationMismatch {
                offset:   slot.offset as u64,
                reserved: slot.len,
                actual:   bytes.len(),
            });
        }
        self.overwrite_at(slot.offset, bytes)
    }
}

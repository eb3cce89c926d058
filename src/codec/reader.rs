use std::ops::Range;

use byteorder::{ByteOrder, LittleEndian};

use super::varint::{decode_varint, zigzag_decode, VarintFault};
use super::{CodecError, CodecResult, Pod};

/// Bounded cursor over `data[start..end]`.
///
/// Positions are absolute offsets into `data`, so errors name the archive
/// offset even when the cursor only covers one section.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos:  usize,
    end:  usize,
}

macro_rules! read_fixed {
    ($($name:ident: $ty:ty => $width:expr, $get:ident;)*) => {
        $(
            #[inline]
            pub fn $name(&mut self) -> CodecResult<$ty> {
                Ok(LittleEndian::$get(self.take($width)?))
            }
        )*
    };
}

impl<'a> ByteReader<'a> {
    /// Cursor over the whole buffer.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, end: data.len() }
    }

    /// Cursor restricted to `range`; fails if the range is not inside `data`.
    pub fn window(data: &'a [u8], range: Range<usize>) -> CodecResult<Self> {
        if range.start > range.end || range.end > data.len() {
            return Err(CodecError::RangeOutOfBuffer {
                start: range.start as u64,
                end:   range.end as u64,
                len:   data.len() as u64,
            });
        }
        Ok(Self { data, pos: range.start, end: range.end })
    }

    /// Absolute offset of the next byte.
    pub fn position(&self) -> u64 { self.pos as u64 }
    pub fn offset(&self) -> usize { self.pos }
    pub fn remaining(&self) -> usize { self.end - self.pos }
    pub fn is_empty(&self) -> bool { self.pos == self.end }

    fn out_of_bounds(&self, wanted: u64) -> CodecError {
        CodecError::OutOfBounds { offset: self.pos as u64, wanted, bound: self.end as u64 }
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.out_of_bounds(len as u64));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> CodecResult<()> {
        self.take(len).map(|_| ())
    }

    pub fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        self.take(len)
    }

    /// Everything left in the window.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..self.end];
        self.pos = self.end;
        rest
    }

    /// Split off the next `len` bytes as their own bounded cursor.
    pub fn sub_reader(&mut self, len: usize) -> CodecResult<ByteReader<'a>> {
        let start = self.pos;
        self.skip(len)?;
        Ok(ByteReader { data: self.data, pos: start, end: start + len })
    }

    // ── Fixed width ─────────────────────────────────────────────────────────

    pub fn read_u8(&mut self) -> CodecResult<u8> { Ok(self.take(1)?[0]) }
    pub fn read_i8(&mut self) -> CodecResult<i8> { Ok(self.take(1)?[0] as i8) }

    pub fn read_bool(&mut self) -> CodecResult<bool> {
        let offset = self.position();
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(CodecError::InvalidEncoding { offset, what: "bool" }),
        }
    }

    read_fixed! {
        read_u16: u16 => 2, read_u16;
        read_u32: u32 => 4, read_u32;
        read_u64: u64 => 8, read_u64;
        read_i16: i16 => 2, read_i16;
        read_i32: i32 => 4, read_i32;
        read_i64: i64 => 8, read_i64;
        read_f32: f32 => 4, read_f32;
        read_f64: f64 => 8, read_f64;
    }

    pub fn read_pod<T: Pod>(&mut self) -> CodecResult<T> {
        let mut out = [T::default()];
        T::read_slice(self.take(T::WIDTH)?, &mut out);
        Ok(out[0])
    }

    // ── Variable width ──────────────────────────────────────────────────────

    pub fn read_uvarint(&mut self) -> CodecResult<u64> {
        let offset = self.position();
        match decode_varint(&self.data[self.pos..self.end]) {
            Ok((value, used)) => {
                self.pos += used;
                Ok(value)
            }
            Err(VarintFault::Overflow) => Err(CodecError::VarintOverflow { offset }),
            Err(VarintFault::Truncated) => Err(self.out_of_bounds(self.remaining() as u64 + 1)),
        }
    }

    pub fn read_ivarint(&mut self) -> CodecResult<i64> {
        self.read_uvarint().map(zigzag_decode)
    }

    /// Varint length, narrowed to `usize`.
    pub fn read_len(&mut self) -> CodecResult<usize> {
        let value = self.read_uvarint()?;
        narrow(value, "usize")
    }

    /// Unsigned integer of type `T`: varint when `packed`, else `T::WIDTH` bytes.
    pub fn read_unsigned<T>(&mut self, packed: bool) -> CodecResult<T>
    where
        T: Pod + TryFrom<u64>,
    {
        if packed {
            let value = self.read_uvarint()?;
            narrow(value, T::NAME)
        } else {
            self.read_pod()
        }
    }

    /// Signed integer of type `T`: zigzag varint when `packed`, else fixed.
    pub fn read_signed<T>(&mut self, packed: bool) -> CodecResult<T>
    where
        T: Pod + TryFrom<i64>,
    {
        if packed {
            let value = self.read_ivarint()?;
            narrow(value, T::NAME)
        } else {
            self.read_pod()
        }
    }

    pub fn read_usize(&mut self, packed: bool) -> CodecResult<usize> {
        let value = if packed { self.read_uvarint()? } else { self.read_u64()? };
        narrow(value, "usize")
    }

    pub fn read_isize(&mut self, packed: bool) -> CodecResult<isize> {
        let value = if packed { self.read_ivarint()? } else { self.read_i64()? };
        narrow(value, "isize")
    }

    // ── Strings and blobs ───────────────────────────────────────────────────

    pub fn read_cstr(&mut self) -> CodecResult<&'a str> {
        let offset = self.position();
        let window = &self.data[self.pos..self.end];
        let nul = window
            .iter()
            .position(|&b| b == 0)
            .ok_or(CodecError::Unterminated { offset })?;
        let text = std::str::from_utf8(&window[..nul])
            .map_err(|_| CodecError::InvalidUtf8 { offset })?;
        self.pos += nul + 1;
        Ok(text)
    }

    pub fn read_string(&mut self) -> CodecResult<&'a str> {
        let offset = self.position();
        let bytes = self.read_blob()?;
        std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8 { offset })
    }

    pub fn read_blob(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.read_len()?;
        self.take(len)
    }

    /// Counterpart of `ByteWriter::write_pod_slice`.  The count is checked
    /// against the window before anything is allocated.
    pub fn read_pod_vec<T: Pod>(&mut self) -> CodecResult<Vec<T>> {
        let count = self.read_len()?;
        let bytes = count
            .checked_mul(T::WIDTH)
            .filter(|&n| n <= self.remaining())
            .ok_or_else(|| self.out_of_bounds((count as u64).saturating_mul(T::WIDTH as u64)))?;
        let src = self.take(bytes)?;
        let mut out = vec![T::default(); count];
        T::read_slice(src, &mut out);
        Ok(out)
    }
}

fn narrow<S, T>(value: S, target: &'static str) -> CodecResult<T>
where
    S: Copy + ToString,
    T: TryFrom<S>,
{
    T::try_from(value).map_err(|_| CodecError::Narrowing { value: value.to_string(), target })
}

//! [`Encode`] / [`Decode`] adapters for std types.
//!
//! - Integers, floats, `bool`, `char`: primitives (`BinValue` scalars).
//!   Integers follow the archive's packing flag; floats are always fixed.
//! - `String` / `str`: binary, raw UTF-8 payload.
//! - `Vec<T>` / `[T]`: a packed fixed-width array when `T` allows it,
//!   otherwise a container of positional children.
//! - `Option`, `Box`, `RefCell`, `&T`: transparent wrappers.
//! - `Rc<T>`: transparent, plus an address identity so shared pointees are
//!   encoded once and decoded to one shared instance.  The encoder holds a
//!   clone of every such `Rc` until it finishes.
//! - Maps and tuples: containers of positional children.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::rc::Rc;

use crate::codec::{ByteReader, ByteWriter, CodecError};
use crate::decoder::{Decode, Decoder};
use crate::encoder::{Encode, Encoder, Identity, ValueKind};
use crate::error::{ArchiveError, ArchiveResult};
use crate::registry::TypeInfo;

// ── Primitives ───────────────────────────────────────────────────────────────

macro_rules! integer {
    ($write:ident, $read:ident: $($ty:ty),*) => {$(
        impl Encode for $ty {
            fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> {
                let packed = encoder.packs_integers();
                encoder.binary_writer()?.$write(*self, packed);
                Ok(())
            }
            fn kind(&self) -> ValueKind { ValueKind::Primitive }
            fn packable() -> bool { true }
            fn write_packed(items: &[Self], writer: &mut ByteWriter) -> ArchiveResult<()> {
                writer.write_pod_slice(items);
                Ok(())
            }
        }

        impl Decode for $ty {
            fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
                let packed = decoder.packs_integers();
                Ok(decoder.binary_reader()?.$read(packed)?)
            }
            fn packable() -> bool { true }
            fn read_packed(reader: &mut ByteReader<'_>) -> ArchiveResult<Vec<Self>> {
                Ok(reader.read_pod_vec()?)
            }
        }
    )*};
}

integer!(write_unsigned, read_unsigned: u8, u16, u32, u64);
integer!(write_signed, read_signed: i8, i16, i32, i64);

macro_rules! float {
    ($($ty:ty),*) => {$(
        impl Encode for $ty {
            fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> {
                encoder.binary_writer()?.write_pod(*self);
                Ok(())
            }
            fn kind(&self) -> ValueKind { ValueKind::Primitive }
            fn packable() -> bool { true }
            fn write_packed(items: &[Self], writer: &mut ByteWriter) -> ArchiveResult<()> {
                writer.write_pod_slice(items);
                Ok(())
            }
        }

        impl Decode for $ty {
            fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
                Ok(decoder.binary_reader()?.read_pod()?)
            }
            fn packable() -> bool { true }
            fn read_packed(reader: &mut ByteReader<'_>) -> ArchiveResult<Vec<Self>> {
                Ok(reader.read_pod_vec()?)
            }
        }
    )*};
}

float!(f32, f64);

impl Encode for bool {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> {
        encoder.binary_writer()?.write_bool(*self);
        Ok(())
    }
    fn kind(&self) -> ValueKind { ValueKind::Primitive }
}

impl Decode for bool {
    fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
        Ok(decoder.binary_reader()?.read_bool()?)
    }
}

impl Encode for char {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> {
        let packed = encoder.packs_integers();
        encoder.binary_writer()?.write_unsigned(u32::from(*self), packed);
        Ok(())
    }
    fn kind(&self) -> ValueKind { ValueKind::Primitive }
}

impl Decode for char {
    fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
        let packed = decoder.packs_integers();
        let mut reader = decoder.binary_reader()?;
        let offset = reader.position();
        let scalar: u32 = reader.read_unsigned(packed)?;
        char::from_u32(scalar).ok_or(ArchiveError::Codec(CodecError::InvalidEncoding { offset, what: "char" }))
    }
}

impl Encode for usize {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> {
        let packed = encoder.packs_integers();
        encoder.binary_writer()?.write_usize(*self, packed);
        Ok(())
    }
    fn kind(&self) -> ValueKind { ValueKind::Primitive }
}

impl Decode for usize {
    fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
        let packed = decoder.packs_integers();
        Ok(decoder.binary_reader()?.read_usize(packed)?)
    }
}

impl Encode for isize {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> {
        let packed = encoder.packs_integers();
        encoder.binary_writer()?.write_isize(*self, packed);
        Ok(())
    }
    fn kind(&self) -> ValueKind { ValueKind::Primitive }
}

impl Decode for isize {
    fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
        let packed = decoder.packs_integers();
        Ok(decoder.binary_reader()?.read_isize(packed)?)
    }
}

// ── Strings ──────────────────────────────────────────────────────────────────

impl Encode for str {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> {
        encoder.binary_writer()?.write_raw(self.as_bytes());
        Ok(())
    }
    fn kind(&self) -> ValueKind { ValueKind::Binary }
}

impl Encode for String {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> {
        self.as_str().encode(encoder)
    }
    fn kind(&self) -> ValueKind { ValueKind::Binary }
}

impl Decode for String {
    fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
        let mut reader = decoder.binary_reader()?;
        let offset = reader.position();
        let text = std::str::from_utf8(reader.read_rest()).map_err(|_| CodecError::InvalidUtf8 { offset })?;
        Ok(text.to_owned())
    }
}

// ── Sequences ────────────────────────────────────────────────────────────────

impl<T: Encode> Encode for [T] {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> {
        if T::packable() {
            return T::write_packed(self, encoder.binary_writer()?);
        }
        for item in self {
            encoder.encode_next(item)?;
        }
        Ok(())
    }

    fn kind(&self) -> ValueKind {
        if T::packable() { ValueKind::Binary } else { ValueKind::Container }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> {
        self.as_slice().encode(encoder)
    }
    fn kind(&self) -> ValueKind {
        self.as_slice().kind()
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
        if T::packable() {
            let mut reader = decoder.binary_reader()?;
            return T::read_packed(&mut reader);
        }
        let mut items = Vec::with_capacity(decoder.remaining()?);
        while decoder.remaining()? > 0 {
            items.push(decoder.decode_next()?);
        }
        Ok(items)
    }
}

// ── Wrappers ─────────────────────────────────────────────────────────────────

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> {
        match self {
            Some(value) => value.encode(encoder),
            None => Ok(()),
        }
    }
    fn kind(&self) -> ValueKind {
        self.as_ref().map_or(ValueKind::Container, Encode::kind)
    }
    fn identity(&self) -> Option<Identity> {
        self.as_ref().and_then(Encode::identity)
    }
    fn retain(&self) -> Option<Box<dyn Any>> {
        self.as_ref().and_then(Encode::retain)
    }
    fn type_info(&self) -> Option<TypeInfo> {
        self.as_ref().and_then(Encode::type_info)
    }
    fn is_absent(&self) -> bool {
        self.as_ref().map_or(true, Encode::is_absent)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
        T::decode(decoder).map(Some)
    }
    fn persisted_type() -> Option<TypeInfo> {
        T::persisted_type()
    }
    fn absent() -> Option<Self> {
        Some(None)
    }
    fn to_shared(&self) -> Option<Rc<dyn Any>> {
        self.as_ref().and_then(Decode::to_shared)
    }
    fn from_shared(shared: Rc<dyn Any>) -> Option<Self> {
        T::from_shared(shared).map(Some)
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> { (**self).encode(encoder) }
    fn kind(&self) -> ValueKind { (**self).kind() }
    fn identity(&self) -> Option<Identity> { (**self).identity() }
    fn retain(&self) -> Option<Box<dyn Any>> { (**self).retain() }
    fn type_info(&self) -> Option<TypeInfo> { (**self).type_info() }
    fn is_absent(&self) -> bool { (**self).is_absent() }
}

impl<T: Encode + ?Sized> Encode for Box<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> { (**self).encode(encoder) }
    fn kind(&self) -> ValueKind { (**self).kind() }
    fn identity(&self) -> Option<Identity> { (**self).identity() }
    fn retain(&self) -> Option<Box<dyn Any>> { (**self).retain() }
    fn type_info(&self) -> Option<TypeInfo> { (**self).type_info() }
    fn is_absent(&self) -> bool { (**self).is_absent() }
}

impl<T: Decode> Decode for Box<T> {
    fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
        T::decode(decoder).map(Box::new)
    }
    fn persisted_type() -> Option<TypeInfo> {
        T::persisted_type()
    }
    fn absent() -> Option<Self> {
        T::absent().map(Box::new)
    }
}

impl<T: Encode + ?Sized + 'static> Encode for Rc<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> { (**self).encode(encoder) }
    fn kind(&self) -> ValueKind { (**self).kind() }
    fn type_info(&self) -> Option<TypeInfo> { (**self).type_info() }
    fn is_absent(&self) -> bool { (**self).is_absent() }

    fn identity(&self) -> Option<Identity> {
        (**self)
            .identity()
            .or(Some(Identity::Address(Rc::as_ptr(self) as *const () as usize)))
    }

    fn retain(&self) -> Option<Box<dyn Any>> {
        match (**self).identity() {
            Some(_) => (**self).retain(),
            None => Some(Box::new(Rc::clone(self))),
        }
    }
}

impl<T: Decode + 'static> Decode for Rc<T> {
    fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
        T::decode(decoder).map(Rc::new)
    }
    fn persisted_type() -> Option<TypeInfo> {
        T::persisted_type()
    }
    fn to_shared(&self) -> Option<Rc<dyn Any>> {
        Some(self.clone() as Rc<dyn Any>)
    }
    fn from_shared(shared: Rc<dyn Any>) -> Option<Self> {
        shared.downcast::<T>().ok()
    }
}

impl<T: Encode + ?Sized> Encode for RefCell<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> {
        let inner = self
            .try_borrow()
            .map_err(|_| ArchiveError::BorrowConflict { key: encoder.current_key().to_owned() })?;
        inner.encode(encoder)
    }
    fn kind(&self) -> ValueKind {
        self.try_borrow().map_or(ValueKind::Container, |inner| inner.kind())
    }
    fn identity(&self) -> Option<Identity> {
        self.try_borrow().ok().and_then(|inner| inner.identity())
    }
    fn retain(&self) -> Option<Box<dyn Any>> {
        self.try_borrow().ok().and_then(|inner| inner.retain())
    }
    fn type_info(&self) -> Option<TypeInfo> {
        self.try_borrow().ok().and_then(|inner| inner.type_info())
    }
    fn is_absent(&self) -> bool {
        self.try_borrow().map_or(false, |inner| inner.is_absent())
    }
}

impl<T: Decode> Decode for RefCell<T> {
    fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
        T::decode(decoder).map(RefCell::new)
    }
    fn persisted_type() -> Option<TypeInfo> {
        T::persisted_type()
    }
    fn absent() -> Option<Self> {
        T::absent().map(RefCell::new)
    }
}

// ── Tuples and maps ──────────────────────────────────────────────────────────

impl<A: Encode, B: Encode> Encode for (A, B) {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> {
        encoder.encode_next(&self.0)?;
        encoder.encode_next(&self.1)
    }
}

impl<A: Decode, B: Decode> Decode for (A, B) {
    fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
        Ok((decoder.decode_next()?, decoder.decode_next()?))
    }
}

impl<A: Encode, B: Encode, C: Encode> Encode for (A, B, C) {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> {
        encoder.encode_next(&self.0)?;
        encoder.encode_next(&self.1)?;
        encoder.encode_next(&self.2)
    }
}

impl<A: Decode, B: Decode, C: Decode> Decode for (A, B, C) {
    fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
        Ok((decoder.decode_next()?, decoder.decode_next()?, decoder.decode_next()?))
    }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> {
        for entry in self {
            encoder.encode_next(&entry)?;
        }
        Ok(())
    }
}

impl<K: Decode + Ord, V: Decode> Decode for BTreeMap<K, V> {
    fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
        let mut map = BTreeMap::new();
        while decoder.remaining()? > 0 {
            let (key, value) = decoder.decode_next::<(K, V)>()?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<K: Encode, V: Encode> Encode for HashMap<K, V> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()> {
        for entry in self {
            encoder.encode_next(&entry)?;
        }
        Ok(())
    }
}

impl<K: Decode + Eq + Hash, V: Decode> Decode for HashMap<K, V> {
    fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self> {
        let mut map = HashMap::with_capacity(decoder.remaining()?);
        while decoder.remaining()? > 0 {
            let (key, value) = decoder.decode_next::<(K, V)>()?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

//! Block schema: the tagged records that make up the body stream.
//!
//! The body is a depth-first, parenthesised encoding of a tree.  Every
//! container-opening block (`Value`, `Ref`, `IdValue`, `IdRef`) owns the
//! blocks up to its matching `End`.  `Bin*` blocks carry a varint
//! length-prefixed payload instead of children.
//!
//! ```text
//! Nil            tag key
//! Value          tag key
//! BinValue       tag key              len payload
//! Ref            tag key type
//! BinRef         tag key type         len payload
//! IdValue        tag key      obj
//! IdBinValue     tag key      obj     len payload
//! IdRef          tag key type obj
//! IdBinRef       tag key type obj     len payload
//! StrongPtr      tag key      obj
//! ConditionalPtr tag key      obj
//! End            tag
//! ```
//!
//! `tag` is one byte; `key`, `type` and `obj` are unsigned varints.

use std::fmt;
use std::ops::Range;

use crate::codec::{ByteReader, ByteWriter, CodecError};
use crate::error::{ArchiveError, ArchiveResult};

// ── Ids ──────────────────────────────────────────────────────────────────────

/// Interned field name.  `KeyId(0)` marks a positional (unkeyed) value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct KeyId(pub u32);

impl KeyId {
    pub const POSITIONAL: KeyId = KeyId(0);

    pub fn is_positional(self) -> bool { self.0 == 0 }
}

/// Index into the type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Identity of one encoded value that can be pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(pub u32);

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "k{}", self.0) }
}
impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "t{}", self.0) }
}
impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

pub(crate) fn read_id(reader: &mut ByteReader<'_>) -> ArchiveResult<u32> {
    let value = reader.read_uvarint()?;
    u32::try_from(value).map_err(|_| {
        ArchiveError::Codec(CodecError::Narrowing { value: value.to_string(), target: "u32" })
    })
}

// ── Tags ─────────────────────────────────────────────────────────────────────

/// On-disk tag byte.  Values are frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockTag {
    Nil            = 1,
    Value          = 2,
    BinValue       = 3,
    Ref            = 4,
    BinRef         = 5,
    IdValue        = 6,
    IdBinValue     = 7,
    IdRef          = 8,
    IdBinRef       = 9,
    StrongPtr      = 10,
    ConditionalPtr = 11,
    End            = 12,
}

impl BlockTag {
    pub fn from_u8(tag: u8) -> Option<Self> {
        use BlockTag::*;
        Some(match tag {
            1  => Nil,
            2  => Value,
            3  => BinValue,
            4  => Ref,
            5  => BinRef,
            6  => IdValue,
            7  => IdBinValue,
            8  => IdRef,
            9  => IdBinRef,
            10 => StrongPtr,
            11 => ConditionalPtr,
            12 => End,
            _  => return None,
        })
    }

    pub fn name(self) -> &'static str {
        use BlockTag::*;
        match self {
            Nil            => "Nil",
            Value          => "Value",
            BinValue       => "BinValue",
            Ref            => "Ref",
            BinRef         => "BinRef",
            IdValue        => "IdValue",
            IdBinValue     => "IdBinValue",
            IdRef          => "IdRef",
            IdBinRef       => "IdBinRef",
            StrongPtr      => "StrongPtr",
            ConditionalPtr => "ConditionalPtr",
            End            => "End",
        }
    }

    /// Choose the tag for a value block from its three independent traits.
    pub fn for_value(typed: bool, identified: bool, binary: bool) -> Self {
        use BlockTag::*;
        match (typed, identified, binary) {
            (false, false, false) => Value,
            (false, false, true)  => BinValue,
            (true,  false, false) => Ref,
            (true,  false, true)  => BinRef,
            (false, true,  false) => IdValue,
            (false, true,  true)  => IdBinValue,
            (true,  true,  false) => IdRef,
            (true,  true,  true)  => IdBinRef,
        }
    }
}

// ── Block ────────────────────────────────────────────────────────────────────

/// One decoded block.  `Payload` ranges are absolute offsets into the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Nil(KeyId),
    Value(KeyId),
    BinValue(KeyId, Range<usize>),
    Ref(KeyId, TypeId),
    BinRef(KeyId, TypeId, Range<usize>),
    IdValue(KeyId, ObjId),
    IdBinValue(KeyId, ObjId, Range<usize>),
    IdRef(KeyId, TypeId, ObjId),
    IdBinRef(KeyId, TypeId, ObjId, Range<usize>),
    StrongPtr(KeyId, ObjId),
    ConditionalPtr(KeyId, ObjId),
    End,
}

impl Block {
    pub fn tag(&self) -> BlockTag {
        match self {
            Block::Nil(..)            => BlockTag::Nil,
            Block::Value(..)          => BlockTag::Value,
            Block::BinValue(..)       => BlockTag::BinValue,
            Block::Ref(..)            => BlockTag::Ref,
            Block::BinRef(..)         => BlockTag::BinRef,
            Block::IdValue(..)        => BlockTag::IdValue,
            Block::IdBinValue(..)     => BlockTag::IdBinValue,
            Block::IdRef(..)          => BlockTag::IdRef,
            Block::IdBinRef(..)       => BlockTag::IdBinRef,
            Block::StrongPtr(..)      => BlockTag::StrongPtr,
            Block::ConditionalPtr(..) => BlockTag::ConditionalPtr,
            Block::End                => BlockTag::End,
        }
    }

    pub fn key(&self) -> Option<KeyId> {
        match *self {
            Block::Nil(k)
            | Block::Value(k)
            | Block::BinValue(k, _)
            | Block::Ref(k, _)
            | Block::BinRef(k, _, _)
            | Block::IdValue(k, _)
            | Block::IdBinValue(k, _, _)
            | Block::IdRef(k, _, _)
            | Block::IdBinRef(k, _, _, _)
            | Block::StrongPtr(k, _)
            | Block::ConditionalPtr(k, _) => Some(k),
            Block::End => None,
        }
    }

    pub fn type_id(&self) -> Option<TypeId> {
        match *self {
            Block::Ref(_, t) | Block::BinRef(_, t, _) | Block::IdRef(_, t, _) | Block::IdBinRef(_, t, _, _) => Some(t),
            _ => None,
        }
    }

    /// The identity this block *defines* (not the one a pointer targets).
    pub fn defined_obj(&self) -> Option<ObjId> {
        match *self {
            Block::IdValue(_, o) | Block::IdBinValue(_, o, _) | Block::IdRef(_, _, o) | Block::IdBinRef(_, _, o, _) => Some(o),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<Range<usize>> {
        match self {
            Block::BinValue(_, p) | Block::BinRef(_, _, p) | Block::IdBinValue(_, _, p) | Block::IdBinRef(_, _, _, p) => {
                Some(p.clone())
            }
            _ => None,
        }
    }

    /// True for blocks whose children run up to a matching `End`.
    pub fn opens_container(&self) -> bool {
        matches!(self, Block::Value(_) | Block::Ref(..) | Block::IdValue(..) | Block::IdRef(..))
    }

    /// Write everything up to (not including) the payload length.
    pub fn write_head(&self, writer: &mut ByteWriter) {
        writer.write_u8(self.tag() as u8);
        if let Some(key) = self.key() {
            writer.write_uvarint(u64::from(key.0));
        }
        if let Some(type_id) = self.type_id() {
            writer.write_uvarint(u64::from(type_id.0));
        }
        let obj = match *self {
            Block::StrongPtr(_, o) | Block::ConditionalPtr(_, o) => Some(o),
            _ => self.defined_obj(),
        };
        if let Some(obj) = obj {
            writer.write_uvarint(u64::from(obj.0));
        }
    }

    /// Write a complete block; `payload` is required for `Bin*` variants.
    pub fn write(&self, writer: &mut ByteWriter, payload: &[u8]) {
        self.write_head(writer);
        if self.payload().is_some() {
            writer.write_blob(payload);
        }
    }

    /// Read one block.  `Bin*` payloads are skipped, not parsed; their range
    /// is recorded so the value can be decoded later.
    pub fn read(reader: &mut ByteReader<'_>) -> ArchiveResult<Block> {
        let offset = reader.position();
        let raw = reader.read_u8()?;
        let tag = BlockTag::from_u8(raw).ok_or(ArchiveError::UnknownBlockTag { tag: raw, offset })?;
        Self::read_body(tag, reader)
    }

    /// Read the fields that follow an already-consumed tag byte.
    pub fn read_body(tag: BlockTag, reader: &mut ByteReader<'_>) -> ArchiveResult<Block> {
        if tag == BlockTag::End {
            return Ok(Block::End);
        }
        let key = KeyId(read_id(reader)?);
        let typed = matches!(tag, BlockTag::Ref | BlockTag::BinRef | BlockTag::IdRef | BlockTag::IdBinRef);
        let type_id = if typed { Some(TypeId(read_id(reader)?)) } else { None };
        let has_obj = matches!(
            tag,
            BlockTag::IdValue
                | BlockTag::IdBinValue
                | BlockTag::IdRef
                | BlockTag::IdBinRef
                | BlockTag::StrongPtr
                | BlockTag::ConditionalPtr
        );
        let obj = if has_obj { Some(ObjId(read_id(reader)?)) } else { None };
        let binary = matches!(tag, BlockTag::BinValue | BlockTag::BinRef | BlockTag::IdBinValue | BlockTag::IdBinRef);
        let payload = if binary {
            let len = reader.read_len()?;
            let start = reader.offset();
            reader.skip(len)?;
            Some(start..start + len)
        } else {
            None
        };

        // The flags above guarantee which options are populated per tag.
        Ok(match (tag, type_id, obj, payload) {
            (BlockTag::Nil, _, _, _)                                  => Block::Nil(key),
            (BlockTag::Value, _, _, _)                                => Block::Value(key),
            (BlockTag::BinValue, _, _, Some(p))                       => Block::BinValue(key, p),
            (BlockTag::Ref, Some(t), _, _)                            => Block::Ref(key, t),
            (BlockTag::BinRef, Some(t), _, Some(p))                   => Block::BinRef(key, t, p),
            (BlockTag::IdValue, _, Some(o), _)                        => Block::IdValue(key, o),
            (BlockTag::IdBinValue, _, Some(o), Some(p))               => Block::IdBinValue(key, o, p),
            (BlockTag::IdRef, Some(t), Some(o), _)                    => Block::IdRef(key, t, o),
            (BlockTag::IdBinRef, Some(t), Some(o), Some(p))           => Block::IdBinRef(key, t, o, p),
            (BlockTag::StrongPtr, _, Some(o), _)                      => Block::StrongPtr(key, o),
            (BlockTag::ConditionalPtr, _, Some(o), _)                 => Block::ConditionalPtr(key, o),
            (tag, ..) => {
                return Err(ArchiveError::UnknownBlockTag { tag: tag as u8, offset: reader.position() })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(block: Block, payload: &[u8]) -> Block {
        let mut w = ByteWriter::new();
        block.write(&mut w, payload);
        let bytes = w.into_inner();
        let mut r = ByteReader::new(&bytes);
        let read = Block::read(&mut r).unwrap();
        assert!(r.is_empty());
        read
    }

    #[test]
    fn tags_are_frozen() {
        assert_eq!(BlockTag::Nil as u8, 1);
        assert_eq!(BlockTag::End as u8, 12);
        for raw in 1..=12u8 {
            assert_eq!(BlockTag::from_u8(raw).map(|t| t as u8), Some(raw));
        }
        assert_eq!(BlockTag::from_u8(0), None);
        assert_eq!(BlockTag::from_u8(13), None);
    }

    #[test]
    fn id_ref_field_order() {
        let mut w = ByteWriter::new();
        Block::IdRef(KeyId(3), TypeId(2), ObjId(300)).write_head(&mut w);
        assert_eq!(w.as_slice(), &[8, 3, 2, 0xAC, 0x02]);
    }

    #[test]
    fn binary_payload_range_is_absolute() {
        let block = roundtrip(Block::IdBinRef(KeyId(1), TypeId(0), ObjId(4), 0..0), b"xyz");
        // tag, key, type, obj, len = 5 bytes before the payload
        assert_eq!(block, Block::IdBinRef(KeyId(1), TypeId(0), ObjId(4), 5..8));
    }

    #[test]
    fn pointers_and_end() {
        assert_eq!(roundtrip(Block::ConditionalPtr(KeyId(0), ObjId(9)), &[]), Block::ConditionalPtr(KeyId(0), ObjId(9)));
        assert_eq!(roundtrip(Block::End, &[]), Block::End);
        assert_eq!(roundtrip(Block::Nil(KeyId(2)), &[]), Block::Nil(KeyId(2)));
    }

    #[test]
    fn unknown_tag_reports_offset() {
        let mut r = ByteReader::new(&[0x40]);
        assert!(matches!(Block::read(&mut r), Err(ArchiveError::UnknownBlockTag { tag: 0x40, offset: 0 })));
    }

    #[test]
    fn truncated_payload_is_out_of_bounds() {
        let mut w = ByteWriter::new();
        Block::BinValue(KeyId(1), 0..0).write(&mut w, b"payload");
        let bytes = w.into_inner();
        let mut r = ByteReader::new(&bytes[..bytes.len() - 1]);
        assert!(matches!(Block::read(&mut r), Err(ArchiveError::Codec(CodecError::OutOfBounds { .. }))));
    }

    #[test]
    fn tag_selection() {
        assert_eq!(BlockTag::for_value(false, false, false), BlockTag::Value);
        assert_eq!(BlockTag::for_value(true, true, true), BlockTag::IdBinRef);
        assert_eq!(BlockTag::for_value(false, true, true), BlockTag::IdBinValue);
    }
}

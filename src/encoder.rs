//! Graph encoder.
//!
//! Walks a value graph through the [`Encode`] trait and emits the block
//! stream.  For every value:
//!
//! 1. Absent values (`None`, at any nesting depth) emit `Nil`.
//! 2. [`ValueKind::Primitive`] values without identity are written straight
//!    into a `BinValue` payload, with no type machinery.  They can not be
//!    encoded conditionally.
//! 3. Everything else may carry an [`Identity`]:
//!    - none: `Value`/`Ref` (or `BinValue`/`BinRef`), children, `End`.
//!      Conditional encoding is an error.
//!    - already emitted strongly: `StrongPtr`/`ConditionalPtr` to it.
//!    - not yet emitted, conditional: a weak placeholder id and a
//!      `ConditionalPtr`.
//!    - not yet emitted, unconditional: the placeholder (if any) is
//!      promoted, then `IdValue`/`IdRef`, children, `End`.
//!
//! A value whose identity is an address is kept alive (see
//! [`Encode::retain`]) until encoding finishes, so the address can not be
//! handed to a later value.
//!
//! Binary payloads are written first and their varint length is spliced in
//! front afterwards, so no value needs to know its encoded size up front.

use std::any::{Any, TypeId as RustTypeId};
use std::collections::{HashMap, HashSet};

use crate::block::{Block, KeyId, ObjId, TypeId};
use crate::codec::{encode_varint, ByteWriter};
use crate::error::{ArchiveError, ArchiveResult};
use crate::index::{KeyTable, TypeEntry, TypeTable};
use crate::io_stream::ArchiveWriter;
use crate::registry::{Registry, TypeInfo};

// ── Trait ────────────────────────────────────────────────────────────────────

/// How a value is laid out in the block stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// A byte scalar (integer, float, bool, char).  Never identity-bearing.
    Primitive,
    /// A self-delimited payload written through [`Encoder::binary_writer`].
    Binary,
    /// Keyed and positional children.
    Container,
}

/// What makes two encoded values "the same object".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Address of a shared allocation (supplied by `Rc<T>`).
    Address(usize),
    /// An application-chosen key.
    Key(u64),
}

pub trait Encode {
    fn encode(&self, encoder: &mut Encoder<'_>) -> ArchiveResult<()>;

    fn kind(&self) -> ValueKind {
        ValueKind::Container
    }

    fn identity(&self) -> Option<Identity> {
        None
    }

    /// Handle that keeps the allocation behind an [`Identity::Address`]
    /// alive while the encoder still maps that address.
    fn retain(&self) -> Option<Box<dyn Any>> {
        None
    }

    /// Persisted type, for reference types that decode polymorphically.
    fn type_info(&self) -> Option<TypeInfo> {
        None
    }

    /// True if this value encodes as `Nil`.
    fn is_absent(&self) -> bool {
        false
    }

    /// Whether a slice of `Self` can be bulk-copied as fixed-width elements.
    fn packable() -> bool
    where
        Self: Sized,
    {
        false
    }

    fn write_packed(items: &[Self], writer: &mut ByteWriter) -> ArchiveResult<()>
    where
        Self: Sized,
    {
        let _ = (items, writer);
        Err(ArchiveError::WrongEncodeFrame { operation: "write_packed", expected: "fixed-width element" })
    }
}

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions<'r> {
    /// Opaque application version, stored in the header.
    pub user_version:  u32,
    /// Varint pack integers.  Bulk arrays stay fixed width either way.
    pub pack_integers: bool,
    /// When set, every persisted type name must resolve back to the same
    /// Rust type through this registry.
    pub registry:      Option<&'r Registry>,
}

impl Default for EncodeOptions<'_> {
    fn default() -> Self {
        Self { user_version: 0, pack_integers: true, registry: None }
    }
}

// ── Encoder ──────────────────────────────────────────────────────────────────

enum Frame {
    Container { seen: HashSet<KeyId> },
    Binary,
}

pub struct Encoder<'r> {
    out:         ArchiveWriter,
    packed:      bool,
    registry:    Option<&'r Registry>,
    frames:      Vec<Frame>,
    /// Identities whose content has been (or is being) emitted.
    strong:      HashMap<Identity, ObjId>,
    /// Identities only referenced conditionally so far.
    weak:        HashMap<Identity, ObjId>,
    retained:    Vec<Box<dyn Any>>,
    next_obj:    u32,
    type_ids:    HashMap<RustTypeId, TypeId>,
    type_owners: HashMap<&'static str, RustTypeId>,
    types:       TypeTable,
    keys:        KeyTable,
    current_key: String,
}

impl<'r> Encoder<'r> {
    pub fn new(options: &EncodeOptions<'r>) -> Self {
        Self {
            out:         ArchiveWriter::new(options.user_version, options.pack_integers),
            packed:      options.pack_integers,
            registry:    options.registry,
            frames:      vec![Frame::Container { seen: HashSet::new() }],
            strong:      HashMap::new(),
            weak:        HashMap::new(),
            retained:    Vec::new(),
            next_obj:    0,
            type_ids:    HashMap::new(),
            type_owners: HashMap::new(),
            types:       TypeTable::default(),
            keys:        KeyTable::default(),
            current_key: String::new(),
        }
    }

    pub fn packs_integers(&self) -> bool {
        self.packed
    }

    pub fn user_version(&self) -> u32 {
        self.out.header.user_version
    }

    /// Name of the key whose value is being encoded, for diagnostics.
    pub fn current_key(&self) -> &str {
        &self.current_key
    }

    // ── Field API ────────────────────────────────────────────────────────────

    pub fn encode<T: Encode + ?Sized>(&mut self, key: &str, value: &T) -> ArchiveResult<()> {
        let key_id = self.keyed(key)?;
        self.encode_value(key_id, key, value, false)
    }

    /// Encode an unkeyed value; order is preserved on decode.
    pub fn encode_next<T: Encode + ?Sized>(&mut self, value: &T) -> ArchiveResult<()> {
        self.container_frame("encode_next")?;
        self.encode_value(KeyId::POSITIONAL, "<positional>", value, false)
    }

    /// Encode a weak reference: it decodes to the value only if that value
    /// is also encoded unconditionally somewhere in the archive.
    pub fn encode_conditional<T: Encode + ?Sized>(&mut self, key: &str, value: &T) -> ArchiveResult<()> {
        let key_id = self.keyed(key)?;
        self.encode_value(key_id, key, value, true)
    }

    pub fn encode_conditional_next<T: Encode + ?Sized>(&mut self, value: &T) -> ArchiveResult<()> {
        self.container_frame("encode_conditional_next")?;
        self.encode_value(KeyId::POSITIONAL, "<positional>", value, true)
    }

    /// Payload writer of the binary value being encoded.
    pub fn binary_writer(&mut self) -> ArchiveResult<&mut ByteWriter> {
        match self.frames.last() {
            Some(Frame::Binary) => Ok(self.out.body()),
            _ => Err(ArchiveError::WrongEncodeFrame { operation: "binary_writer", expected: "binary" }),
        }
    }

    /// Encode `root` and produce the archive bytes.
    pub fn finish_with<T: Encode + ?Sized>(mut self, root: &T) -> ArchiveResult<Vec<u8>> {
        self.encode_value(KeyId::POSITIONAL, "<root>", root, false)?;
        tracing::debug!(
            objects = self.strong.len(),
            unresolved_weak = self.weak.len(),
            types = self.types.len(),
            keys = self.keys.len(),
            body_bytes = self.out.body_len(),
            "graph encoded"
        );
        self.out.finish(&self.types, &self.keys)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn container_frame(&mut self, operation: &'static str) -> ArchiveResult<&mut HashSet<KeyId>> {
        match self.frames.last_mut() {
            Some(Frame::Container { seen }) => Ok(seen),
            _ => Err(ArchiveError::WrongEncodeFrame { operation, expected: "container" }),
        }
    }

    /// Intern `key` and reject it if this container has already used it.
    fn keyed(&mut self, key: &str) -> ArchiveResult<KeyId> {
        let id = self.keys.intern(key);
        let seen = self.container_frame("encode")?;
        if !seen.insert(id) {
            return Err(ArchiveError::DuplicateKey { key: key.to_owned() });
        }
        Ok(id)
    }

    fn encode_value<T: Encode + ?Sized>(
        &mut self,
        key: KeyId,
        label: &str,
        value: &T,
        conditional: bool,
    ) -> ArchiveResult<()> {
        self.current_key.clear();
        self.current_key.push_str(label);

        if value.is_absent() {
            Block::Nil(key).write_head(self.out.body());
            return Ok(());
        }

        let Some(identity) = value.identity() else {
            if value.kind() == ValueKind::Primitive {
                if conditional {
                    return Err(ArchiveError::ConditionalPrimitive { key: label.to_owned() });
                }
                return self.emit(Block::BinValue(key, 0..0), value);
            }
            if conditional {
                return Err(ArchiveError::ConditionalWithoutIdentity { key: label.to_owned() });
            }
            let block = self.content_block(key, value, None)?;
            return self.emit(block, value);
        };

        if let Some(&obj) = self.strong.get(&identity) {
            tracing::trace!(%obj, conditional, "pointer to emitted object");
            let block = if conditional { Block::ConditionalPtr(key, obj) } else { Block::StrongPtr(key, obj) };
            block.write_head(self.out.body());
            return Ok(());
        }

        if conditional {
            let obj = match self.weak.get(&identity) {
                Some(&obj) => obj,
                None => {
                    let obj = self.allocate_obj();
                    self.weak.insert(identity, obj);
                    self.retained.extend(value.retain());
                    obj
                }
            };
            tracing::trace!(%obj, "weak placeholder");
            Block::ConditionalPtr(key, obj).write_head(self.out.body());
            return Ok(());
        }

        let obj = match self.weak.remove(&identity) {
            Some(obj) => obj,
            None => {
                self.retained.extend(value.retain());
                self.allocate_obj()
            }
        };
        self.strong.insert(identity, obj);
        tracing::trace!(%obj, "object defined");
        let block = self.content_block(key, value, Some(obj))?;
        self.emit(block, value)
    }

    fn allocate_obj(&mut self) -> ObjId {
        let obj = ObjId(self.next_obj);
        self.next_obj += 1;
        obj
    }

    /// Pick the content-bearing block for a value that is not a bare
    /// primitive.  Primitives with identity get a binary block.
    fn content_block<T: Encode + ?Sized>(&mut self, key: KeyId, value: &T, obj: Option<ObjId>) -> ArchiveResult<Block> {
        let type_id = match value.type_info() {
            Some(info) => Some(self.intern_type(info)?),
            None => None,
        };
        let binary = value.kind() != ValueKind::Container;
        Ok(match (type_id, obj, binary) {
            (None, None, false)       => Block::Value(key),
            (None, None, true)        => Block::BinValue(key, 0..0),
            (Some(t), None, false)    => Block::Ref(key, t),
            (Some(t), None, true)     => Block::BinRef(key, t, 0..0),
            (None, Some(o), false)    => Block::IdValue(key, o),
            (None, Some(o), true)     => Block::IdBinValue(key, o, 0..0),
            (Some(t), Some(o), false) => Block::IdRef(key, t, o),
            (Some(t), Some(o), true)  => Block::IdBinRef(key, t, o, 0..0),
        })
    }

    /// Write `block`, then the value's content in the matching frame.
    fn emit<T: Encode + ?Sized>(&mut self, block: Block, value: &T) -> ArchiveResult<()> {
        block.write_head(self.out.body());
        if block.payload().is_some() {
            let start = self.out.body().len();
            self.frames.push(Frame::Binary);
            let result = value.encode(self);
            self.frames.pop();
            result?;
            let len = self.out.body().len() - start;
            let mut prefix = Vec::with_capacity(crate::codec::MAX_VARINT_LEN);
            encode_varint(&mut prefix, len as u64);
            self.out.body().insert_at(start, &prefix)?;
        } else {
            self.frames.push(Frame::Container { seen: HashSet::new() });
            let result = value.encode(self);
            self.frames.pop();
            result?;
            Block::End.write_head(self.out.body());
        }
        Ok(())
    }

    fn intern_type(&mut self, info: TypeInfo) -> ArchiveResult<TypeId> {
        if let Some(&id) = self.type_ids.get(&info.rust_type) {
            return Ok(id);
        }
        if info.name.is_empty() {
            return Err(ArchiveError::InvalidTypeName { name: String::new(), reason: "name is empty" });
        }
        if info.name.contains('\0') {
            return Err(ArchiveError::InvalidTypeName { name: info.name.to_owned(), reason: "name contains NUL" });
        }
        if let Some(&owner) = self.type_owners.get(info.name) {
            if owner != info.rust_type {
                return Err(ArchiveError::TypeNameCollision { name: info.name.to_owned() });
            }
        }
        if let Some(registry) = self.registry {
            let resolves = registry
                .resolve(info.name)
                .is_some_and(|found| found.info.rust_type == info.rust_type);
            if !resolves {
                return Err(ArchiveError::UnresolvableType { name: info.name.to_owned() });
            }
        }

        let id = TypeId(self.types.len() as u32);
        self.types.insert(TypeEntry { id: id.0, name: info.name.to_owned(), version: info.version })?;
        self.type_ids.insert(info.rust_type, id);
        self.type_owners.insert(info.name, info.rust_type);
        tracing::trace!(type_id = %id, name = info.name, version = info.version, "type interned");
        Ok(id)
    }
}

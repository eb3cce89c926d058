//! Graph decoder.
//!
//! Decoding runs in three steps:
//!
//! 1. **Linearize** ([`crate::io_stream`]): body bytes to a flat block list.
//! 2. **Flatten** ([`flatten`]): block list to a tree plus an object map
//!    holding every identity-bearing subtree.
//! 3. **Construct** ([`Decoder`]): depth-first instantiation from the root.
//!
//! Pointer resolution during construction:
//!
//! - target already constructed and shared: reuse it
//!   ([`Decode::from_shared`]).
//! - target still in the object map: remove and construct it now, then
//!   cache it if it can be shared ([`Decode::to_shared`]).
//! - neither, conditional pointer: absent.
//! - neither, strong pointer: the target is still under construction
//!   ([`ArchiveError::PossibleCycle`]) or was consumed by value
//!   ([`ArchiveError::IdentityConsumed`]).
//!
//! A cycle is broken by decoding the back-edge with
//! [`Decoder::defer_decode`]: the field is decoded after the root has been
//! constructed, when every shared object is in the cache.

pub mod flatten;

use std::any::{type_name, Any};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use crate::block::ObjId;
use crate::codec::ByteReader;
use crate::error::{ArchiveError, ArchiveResult};
use crate::index::{KeyTable, TypeTable};
use crate::io_stream::Contents;
use crate::registry::{Registry, TypeInfo};
use crate::superblock::Superblock;

pub use flatten::{flatten, Node, NodeKind, Tree};

// ── Trait ────────────────────────────────────────────────────────────────────

pub trait Decode: Sized {
    fn decode(decoder: &mut Decoder<'_>) -> ArchiveResult<Self>;

    /// Persisted type this Rust type expects, checked against the archive
    /// through the registry before [`decode`](Self::decode) runs.
    fn persisted_type() -> Option<TypeInfo> {
        None
    }

    /// Value to use for a missing key, a `Nil` block or an unresolved
    /// conditional pointer.  `None` makes those cases an error.
    fn absent() -> Option<Self> {
        None
    }

    /// Shareable handle to this value, cached under its identity.
    fn to_shared(&self) -> Option<Rc<dyn Any>> {
        None
    }

    /// Rebuild from a cached shared handle.
    fn from_shared(shared: Rc<dyn Any>) -> Option<Self> {
        let _ = shared;
        None
    }

    fn packable() -> bool {
        false
    }

    fn read_packed(reader: &mut ByteReader<'_>) -> ArchiveResult<Vec<Self>> {
        Err(ArchiveError::ShapeMismatch {
            expected: "container",
            found:    "packed array",
            offset:   reader.position(),
        })
    }
}

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Deepest container nesting accepted, in blocks.
    pub max_depth: usize,
}

pub const DEFAULT_MAX_DEPTH: usize = 1024;

impl Default for DecodeOptions {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH }
    }
}

// ── Decoder ──────────────────────────────────────────────────────────────────

struct Frame {
    node:    Node,
    version: u32,
    obj:     Option<ObjId>,
}

type Deferred<'a> = Box<dyn FnOnce(&mut Decoder<'a>) -> ArchiveResult<()> + 'a>;

pub struct Decoder<'a> {
    data:      &'a [u8],
    header:    Superblock,
    types:     &'a TypeTable,
    keys:      &'a KeyTable,
    registry:  &'a Registry,
    max_depth: usize,
    objects:   HashMap<ObjId, Node>,
    cache:     HashMap<ObjId, Rc<dyn Any>>,
    consumed:  HashSet<ObjId>,
    frames:    Vec<Frame>,
    deferred:  VecDeque<Deferred<'a>>,
}

/// Flatten `contents` and construct its root as `T`.
pub fn decode_contents<T: Decode>(
    contents: &Contents<'_>,
    registry: &Registry,
    options: &DecodeOptions,
) -> ArchiveResult<T> {
    let tree = flatten(&contents.blocks, &contents.keys, &contents.types, options.max_depth)?;
    let decoder = Decoder {
        data:      contents.data,
        header:    contents.header,
        types:     &contents.types,
        keys:      &contents.keys,
        registry,
        max_depth: options.max_depth,
        objects:   tree.objects,
        cache:     HashMap::new(),
        consumed:  HashSet::new(),
        frames:    Vec::new(),
        deferred:  VecDeque::new(),
    };
    decoder.run(tree.root)
}

impl<'a> Decoder<'a> {
    fn run<T: Decode>(mut self, root: Node) -> ArchiveResult<T> {
        let value = self.decode_node::<T>(root, "<root>")?;
        let mut jobs = 0usize;
        while let Some(job) = self.deferred.pop_front() {
            job(&mut self)?;
            jobs += 1;
        }
        tracing::debug!(
            shared = self.cache.len(),
            consumed = self.consumed.len(),
            unreferenced = self.objects.len(),
            deferred = jobs,
            "graph decoded"
        );
        Ok(value)
    }

    // ── Field API ────────────────────────────────────────────────────────────

    pub fn decode<T: Decode>(&mut self, key: &str) -> ArchiveResult<T> {
        let child = self.take_keyed(key)?;
        match child {
            Some(node) => self.decode_node(node, key),
            None => T::absent().ok_or_else(|| ArchiveError::ValueNotFound { key: key.to_owned() }),
        }
    }

    /// Next positional value, in encoding order.
    pub fn decode_next<T: Decode>(&mut self) -> ArchiveResult<T> {
        let child = self.container_frame("<positional>")?.node.positional.pop();
        match child {
            Some(node) => self.decode_node(node, "<positional>"),
            None => T::absent().ok_or_else(|| ArchiveError::ValueNotFound { key: "<positional>".into() }),
        }
    }

    /// Register `setter` to receive the value of `key` once the root has
    /// been constructed.  The value being decoded must be identity-bearing
    /// and decoded as a shared `Rc<O>`.
    pub fn defer_decode<O, T, F>(&mut self, key: &str, setter: F) -> ArchiveResult<()>
    where
        O: Any,
        T: Decode + 'a,
        F: FnOnce(&Rc<O>, T) + 'a,
    {
        let owner = self
            .container_frame(key)?
            .obj
            .ok_or_else(|| ArchiveError::DeferredWithoutOwner { key: key.to_owned() })?;
        let node = self.take_keyed(key)?;
        let label = key.to_owned();
        tracing::trace!(%owner, key, "decode deferred");

        self.deferred.push_back(Box::new(move |decoder: &mut Decoder<'a>| {
            let shared = decoder
                .cache
                .get(&owner)
                .cloned()
                .ok_or_else(|| ArchiveError::DeferredWithoutOwner { key: label.clone() })?;
            let owner = shared.downcast::<O>().map_err(|_| ArchiveError::TypeMismatch {
                expected: type_name::<O>().to_owned(),
                found:    format!("shared object {owner}"),
            })?;
            let value = match node {
                Some(node) => decoder.decode_node::<T>(node, &label)?,
                None => T::absent().ok_or_else(|| ArchiveError::ValueNotFound { key: label.clone() })?,
            };
            setter(&owner, value);
            Ok(())
        }));
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        match (self.keys.id(key), self.frames.last()) {
            (Some(id), Some(frame)) => frame.node.keyed.contains_key(&id),
            _ => false,
        }
    }

    /// Positional values not yet decoded.
    pub fn remaining(&mut self) -> ArchiveResult<usize> {
        Ok(self.container_frame("<positional>")?.node.positional.len())
    }

    /// Schema version the current value's type had when it was encoded;
    /// 0 for untyped values.
    pub fn encoded_version(&self) -> u32 {
        self.frames.last().map_or(0, |frame| frame.version)
    }

    pub fn user_version(&self) -> u32 {
        self.header.user_version
    }

    pub fn packs_integers(&self) -> bool {
        self.header.packed_integers()
    }

    /// Cursor over the payload of the binary value being decoded.
    pub fn binary_reader(&self) -> ArchiveResult<ByteReader<'a>> {
        let frame = self.frames.last().ok_or(ArchiveError::ShapeMismatch {
            expected: "binary value",
            found:    "no value",
            offset:   0,
        })?;
        match &frame.node.kind {
            NodeKind::Binary(range) => Ok(ByteReader::window(self.data, range.clone())?),
            other => Err(ArchiveError::ShapeMismatch {
                expected: "binary value",
                found:    other.name(),
                offset:   frame.node.offset,
            }),
        }
    }

    /// Construct the current typed value through its registry entry.
    pub(crate) fn construct_registered(&mut self) -> ArchiveResult<Rc<dyn Any>> {
        let frame = self.frames.last().ok_or(ArchiveError::MissingRoot)?;
        let Some(type_id) = frame.node.type_id else {
            return Err(ArchiveError::TypeMismatch {
                expected: "registered type".into(),
                found:    "untyped value".into(),
            });
        };
        let entry = self
            .types
            .get(type_id)
            .ok_or(ArchiveError::UnknownTypeId { type_id, offset: frame.node.offset })?;
        let construct = self
            .registry
            .resolve(&entry.name)
            .map(|registered| registered.construct)
            .ok_or_else(|| ArchiveError::UndecodableType {
                name:    entry.name.clone(),
                version: entry.version,
            })?;
        construct(self)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn frame_mut(&mut self, key: &str) -> ArchiveResult<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| ArchiveError::ValueNotFound { key: key.to_owned() })
    }

    /// The current frame, which must be a container to hold children.
    fn container_frame(&mut self, key: &str) -> ArchiveResult<&mut Frame> {
        let frame = self.frame_mut(key)?;
        if frame.node.kind == NodeKind::Container {
            return Ok(frame);
        }
        Err(ArchiveError::ShapeMismatch {
            expected: "container",
            found:    frame.node.kind.name(),
            offset:   frame.node.offset,
        })
    }

    fn take_keyed(&mut self, key: &str) -> ArchiveResult<Option<Node>> {
        let id = self.keys.id(key);
        let frame = self.container_frame(key)?;
        Ok(id.and_then(|id| frame.node.keyed.remove(&id)))
    }

    fn decode_node<T: Decode>(&mut self, node: Node, key: &str) -> ArchiveResult<T> {
        match node.kind {
            NodeKind::Nil => T::absent().ok_or_else(|| ArchiveError::ValueNotFound { key: key.to_owned() }),
            NodeKind::StrongPtr(obj) => self.resolve(obj, false, key, node.offset),
            NodeKind::ConditionalPtr(obj) => self.resolve(obj, true, key, node.offset),
            NodeKind::Container | NodeKind::Binary(_) => self.construct(node),
        }
    }

    fn resolve<T: Decode>(&mut self, obj: ObjId, conditional: bool, key: &str, offset: u64) -> ArchiveResult<T> {
        if let Some(shared) = self.cache.get(&obj) {
            return T::from_shared(shared.clone()).ok_or_else(|| ArchiveError::TypeMismatch {
                expected: type_name::<T>().to_owned(),
                found:    format!("shared object {obj}"),
            });
        }
        if let Some(node) = self.objects.remove(&obj) {
            tracing::trace!(%obj, key, "constructing object");
            return self.construct(node);
        }
        if conditional {
            tracing::trace!(%obj, key, "conditional pointer unresolved");
            return T::absent().ok_or_else(|| ArchiveError::ValueNotFound { key: key.to_owned() });
        }
        if self.consumed.contains(&obj) {
            Err(ArchiveError::IdentityConsumed { obj, key: key.to_owned() })
        } else {
            Err(ArchiveError::PossibleCycle { obj, key: key.to_owned(), offset })
        }
    }

    fn construct<T: Decode>(&mut self, node: Node) -> ArchiveResult<T> {
        if self.frames.len() >= self.max_depth {
            return Err(ArchiveError::DepthExceeded { limit: self.max_depth, offset: node.offset });
        }
        let version = self.check_type::<T>(&node)?;
        let obj = node.obj;
        self.frames.push(Frame { node, version, obj });
        let result = T::decode(self);
        self.frames.pop();
        let value = result?;

        if let Some(obj) = obj {
            match value.to_shared() {
                Some(shared) => {
                    self.cache.insert(obj, shared);
                }
                None => {
                    self.consumed.insert(obj);
                }
            }
        }
        Ok(value)
    }

    /// Check a typed node against what `T` expects; returns the version the
    /// type was encoded with.
    fn check_type<T: Decode>(&self, node: &Node) -> ArchiveResult<u32> {
        let expected = T::persisted_type();
        let Some(type_id) = node.type_id else {
            return match expected {
                Some(expected) => Err(ArchiveError::TypeMismatch {
                    expected: expected.name.to_owned(),
                    found:    "untyped value".into(),
                }),
                None => Ok(0),
            };
        };
        let entry = self
            .types
            .get(type_id)
            .ok_or(ArchiveError::UnknownTypeId { type_id, offset: node.offset })?;
        if let Some(expected) = expected {
            let resolved = self.registry.resolve(&entry.name).ok_or_else(|| ArchiveError::UndecodableType {
                name:    entry.name.clone(),
                version: entry.version,
            })?;
            if resolved.info.rust_type != expected.rust_type {
                return Err(ArchiveError::TypeMismatch {
                    expected: expected.name.to_owned(),
                    found:    entry.name.clone(),
                });
            }
        }
        Ok(entry.version)
    }
}

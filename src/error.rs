//! Archive error taxonomy.
//!
//! Every failure is deterministic in the bytes or the graph being encoded, so
//! nothing here is retried.  Each variant carries enough context (offset,
//! id, name) to diagnose without re-running with a dump.

use thiserror::Error;

use crate::block::{KeyId, ObjId, TypeId};
use crate::codec::CodecError;
use crate::superblock::Section;

/// Coarse classification of an [`ArchiveError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Header, section map or bounds: the archive is rejected outright.
    Framing,
    /// The block stream or its tables are malformed.
    Structural,
    /// A strong pointer could not be satisfied.
    Identity,
    /// A type could not be resolved, or the decoded shape is wrong.
    Type,
    /// The caller asked the encoder for something it cannot express.
    Usage,
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    // ── Framing ──────────────────────────────────────────────────────────────
    #[error("invalid magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),
    #[error("section {0:?} is missing from the section map")]
    MissingSection(Section),
    #[error("section {0:?} appears more than once in the section map")]
    DuplicateSection(Section),
    #[error("section {section:?} range {start}..{end} is invalid for an archive of {len} byte(s)")]
    SectionOutOfRange { section: Section, start: u64, end: u64, len: u64 },
    #[error("sections {first:?} and {second:?} overlap")]
    OverlappingSections { first: Section, second: Section },
    #[error("{section:?} section has {trailing} unread byte(s) after its last entry")]
    TrailingSectionBytes { section: Section, trailing: usize },
    #[error(transparent)]
    Codec(#[from] CodecError),

    // ── Structural ───────────────────────────────────────────────────────────
    #[error("unknown block tag 0x{tag:02x} at offset {offset}")]
    UnknownBlockTag { tag: u8, offset: u64 },
    #[error("End block at offset {offset} closes no open container")]
    UnexpectedEnd { offset: u64 },
    #[error("{open} container(s) still open at the end of the block stream")]
    UnterminatedContainer { open: usize },
    #[error("the block stream holds no root value")]
    MissingRoot,
    #[error("second top-level value at offset {offset}; an archive holds exactly one root")]
    TrailingRoot { offset: u64 },
    #[error("object {obj} is defined twice (second definition at offset {offset})")]
    DuplicateObjId { obj: ObjId, offset: u64 },
    #[error("key {key:?} appears twice in one container (offset {offset})")]
    DuplicateKeyInArchive { key: String, offset: u64 },
    #[error("block at offset {offset} uses key id {key} missing from the key table")]
    UnknownKeyId { key: KeyId, offset: u64 },
    #[error("block at offset {offset} uses type id {type_id} missing from the type table")]
    UnknownTypeId { type_id: TypeId, offset: u64 },
    #[error("{table} table defines id {id} twice")]
    DuplicateTableEntry { table: &'static str, id: u32 },
    #[error("nesting at offset {offset} exceeds the depth limit of {limit}")]
    DepthExceeded { limit: usize, offset: u64 },

    // ── Identity ─────────────────────────────────────────────────────────────
    #[error("possible cycle: strong pointer to object {obj} (key {key:?}, offset {offset}) \
             whose construction has not finished; decode that field with defer_decode")]
    PossibleCycle { obj: ObjId, key: String, offset: u64 },
    #[error("object {obj} was already decoded by value and cannot be shared (key {key:?})")]
    IdentityConsumed { obj: ObjId, key: String },
    #[error("deferred decode of key {key:?} needs an owner decoded as a shared reference")]
    DeferredWithoutOwner { key: String },

    // ── Type ─────────────────────────────────────────────────────────────────
    #[error("type {name:?} (version {version}) cannot be resolved to a registered type")]
    UndecodableType { name: String, version: u32 },
    #[error("type mismatch: expected {expected}, archive holds {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("no value for key {key:?}")]
    ValueNotFound { key: String },
    #[error("expected {expected} at offset {offset}, found {found}")]
    ShapeMismatch { expected: &'static str, found: &'static str, offset: u64 },

    // ── Usage ────────────────────────────────────────────────────────────────
    #[error("key {key:?} encoded twice in the same container")]
    DuplicateKey { key: String },
    #[error("conditional encoding of key {key:?} needs a value with identity")]
    ConditionalWithoutIdentity { key: String },
    #[error("primitive value for key {key:?} cannot be encoded conditionally")]
    ConditionalPrimitive { key: String },
    #[error("invalid persisted type name {name:?}: {reason}")]
    InvalidTypeName { name: String, reason: &'static str },
    #[error("persisted type name {name:?} is claimed by two different types")]
    TypeNameCollision { name: String },
    #[error("type {name:?} does not resolve back to itself through the registry")]
    UnresolvableType { name: String },
    #[error("{operation} is only valid inside a {expected} value")]
    WrongEncodeFrame { operation: &'static str, expected: &'static str },
    #[error("value for key {key:?} is mutably borrowed during encoding")]
    BorrowConflict { key: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    pub fn category(&self) -> ErrorCategory {
        use ArchiveError::*;
        match self {
            InvalidMagic { .. }
            | UnsupportedVersion(_)
            | MissingSection(_)
            | DuplicateSection(_)
            | SectionOutOfRange { .. }
            | OverlappingSections { .. }
            | TrailingSectionBytes { .. }
            | Io(_) => ErrorCategory::Framing,
            Codec(CodecError::Narrowing { .. }) => ErrorCategory::Type,
            Codec(CodecError::InvalidUtf8 { .. } | CodecError::InvalidEncoding { .. }) => {
                ErrorCategory::Structural
            }
            Codec(_) => ErrorCategory::Framing,
            UnknownBlockTag { .. }
            | UnexpectedEnd { .. }
            | UnterminatedContainer { .. }
            | MissingRoot
            | TrailingRoot { .. }
            | DuplicateObjId { .. }
            | DuplicateKeyInArchive { .. }
            | UnknownKeyId { .. }
            | UnknownTypeId { .. }
            | DuplicateTableEntry { .. }
            | DepthExceeded { .. } => ErrorCategory::Structural,
            PossibleCycle { .. } | IdentityConsumed { .. } | DeferredWithoutOwner { .. } => {
                ErrorCategory::Identity
            }
            UndecodableType { .. }
            | TypeMismatch { .. }
            | ValueNotFound { .. }
            | ShapeMismatch { .. } => ErrorCategory::Type,
            DuplicateKey { .. }
            | ConditionalWithoutIdentity { .. }
            | ConditionalPrimitive { .. }
            | InvalidTypeName { .. }
            | TypeNameCollision { .. }
            | UnresolvableType { .. }
            | WrongEncodeFrame { .. }
            | BorrowConflict { .. } => ErrorCategory::Usage,
        }
    }
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowing_is_a_type_error() {
        let err = ArchiveError::from(CodecError::Narrowing { value: "300".into(), target: "u8" });
        assert_eq!(err.category(), ErrorCategory::Type);
    }

    #[test]
    fn bounds_are_framing_errors() {
        let err = ArchiveError::from(CodecError::OutOfBounds { offset: 9, wanted: 4, bound: 10 });
        assert_eq!(err.category(), ErrorCategory::Framing);
        assert!(err.to_string().contains("offset 9"));
    }

    #[test]
    fn cycle_message_names_the_object() {
        let err = ArchiveError::PossibleCycle { obj: ObjId(7), key: "next".into(), offset: 40 };
        assert_eq!(err.category(), ErrorCategory::Identity);
        assert!(err.to_string().contains("object #7"));
    }
}

//! Graph-aware binary archives.
//!
//! Values are written through [`Encode`] and read back through [`Decode`].
//! Shared `Rc` pointees are stored once and come back shared, weak
//! references are kept only when their target is also stored strongly, and
//! reference types carry a name and schema version that a [`Registry`]
//! resolves on read.

pub mod superblock;
pub mod codec;
pub mod block;
pub mod index;
pub mod recovery;
pub mod io_stream;
pub mod registry;
pub mod encoder;
pub mod decoder;
pub mod impls;
pub mod archive;
pub mod dump;
pub mod error;

pub use superblock::Superblock;
pub use block::{Block, KeyId, ObjId, TypeId};
pub use index::{KeyTable, TypeEntry, TypeTable};
pub use encoder::{Encode, EncodeOptions, Encoder, Identity, ValueKind};
pub use decoder::{Decode, DecodeOptions, Decoder};
pub use registry::{AnyRef, GraphType, Registry, TypeInfo};
pub use archive::{Archive, ArchiveInfo};
pub use dump::DumpOptions;
pub use error::{ArchiveError, ArchiveResult, ErrorCategory};

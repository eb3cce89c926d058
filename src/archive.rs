//! High-level API: the primary embedding surface.
//!
//! ```no_run
//! use graphark::archive::{self, Archive};
//! use graphark::Registry;
//!
//! // Write
//! let bytes = archive::encode(&vec![1u32, 2, 3], 7)?;
//!
//! // Read
//! let ar = Archive::from_bytes(&bytes)?;
//! assert_eq!(ar.header().user_version, 7);
//! let numbers: Vec<u32> = ar.decode(&Registry::new())?;
//! assert_eq!(numbers, [1, 2, 3]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::decoder::{decode_contents, Decode, DecodeOptions};
use crate::dump::{self, DumpOptions};
use crate::encoder::{Encode, EncodeOptions, Encoder};
use crate::error::ArchiveResult;
use crate::index::TypeEntry;
use crate::io_stream::ArchiveReader;
use crate::registry::Registry;
use crate::superblock::{Section, SectionMap, Superblock};

// ── Free functions ───────────────────────────────────────────────────────────

pub fn encode<T: Encode + ?Sized>(root: &T, user_version: u32) -> ArchiveResult<Vec<u8>> {
    encode_with(root, &EncodeOptions { user_version, ..EncodeOptions::default() })
}

pub fn encode_with<T: Encode + ?Sized>(root: &T, options: &EncodeOptions<'_>) -> ArchiveResult<Vec<u8>> {
    Encoder::new(options).finish_with(root)
}

pub fn decode<T: Decode>(bytes: &[u8], registry: &Registry) -> ArchiveResult<T> {
    Archive::from_bytes(bytes)?.decode(registry)
}

pub fn decode_with<T: Decode>(bytes: &[u8], registry: &Registry, options: &DecodeOptions) -> ArchiveResult<T> {
    Archive::from_bytes(bytes)?.decode_with(registry, options)
}

/// Names and versions of every persisted type.  Reads the header and the
/// type table only.
pub fn list_persisted_types(bytes: &[u8]) -> ArchiveResult<Vec<TypeEntry>> {
    Archive::from_bytes(bytes)?.persisted_types()
}

/// Persisted types that `registry` cannot resolve.
pub fn list_undecodable_types(bytes: &[u8], registry: &Registry) -> ArchiveResult<Vec<TypeEntry>> {
    Archive::from_bytes(bytes)?.undecodable_types(registry)
}

/// Encode `root` and write it to `path`.
pub fn save<T, P>(path: P, root: &T, options: &EncodeOptions<'_>) -> ArchiveResult<()>
where
    T: Encode + ?Sized,
    P: AsRef<Path>,
{
    let bytes = encode_with(root, options)?;
    fs::write(path.as_ref(), &bytes)?;
    tracing::debug!(path = %path.as_ref().display(), bytes = bytes.len(), "archive saved");
    Ok(())
}

// ── ArchiveInfo ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SectionInfo {
    pub section: Section,
    pub start:   u64,
    pub end:     u64,
}

/// Summary returned by [`Archive::info`].
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    pub format_version:  u32,
    pub user_version:    u32,
    pub packed_integers: bool,
    pub legacy:          bool,
    pub total_bytes:     usize,
    pub sections:        Vec<SectionInfo>,
    pub blocks:          usize,
    pub objects:         usize,
    pub types:           usize,
    pub keys:            usize,
}

// ── Archive ──────────────────────────────────────────────────────────────────

/// A validated archive: header and section map have been checked, nothing
/// else has been parsed yet.
#[derive(Debug, Clone)]
pub struct Archive<'a> {
    bytes:    Cow<'a, [u8]>,
    header:   Superblock,
    sections: Option<SectionMap>,
}

impl Archive<'static> {
    pub fn open<P: AsRef<Path>>(path: P) -> ArchiveResult<Self> {
        let bytes = fs::read(path.as_ref())?;
        let reader = ArchiveReader::open(&bytes)?;
        let (header, sections) = (reader.header, reader.sections);
        Ok(Self { bytes: Cow::Owned(bytes), header, sections })
    }
}

impl<'a> Archive<'a> {
    pub fn from_bytes(bytes: &'a [u8]) -> ArchiveResult<Self> {
        let reader = ArchiveReader::open(bytes)?;
        Ok(Self { bytes: Cow::Borrowed(bytes), header: reader.header, sections: reader.sections })
    }

    pub fn header(&self) -> Superblock {
        self.header
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_legacy(&self) -> bool {
        self.sections.is_none()
    }

    fn reader(&self) -> ArchiveReader<'_> {
        ArchiveReader::from_parts(&self.bytes, self.header, self.sections.clone())
    }

    pub fn persisted_types(&self) -> ArchiveResult<Vec<TypeEntry>> {
        Ok(self.reader().read_types()?.entries().to_vec())
    }

    pub fn undecodable_types(&self, registry: &Registry) -> ArchiveResult<Vec<TypeEntry>> {
        let mut types = self.persisted_types()?;
        types.retain(|entry| registry.resolve(&entry.name).is_none());
        Ok(types)
    }

    pub fn decode<T: Decode>(&self, registry: &Registry) -> ArchiveResult<T> {
        self.decode_with(registry, &DecodeOptions::default())
    }

    pub fn decode_with<T: Decode>(&self, registry: &Registry, options: &DecodeOptions) -> ArchiveResult<T> {
        let contents = self.reader().contents()?;
        decode_contents(&contents, registry, options)
    }

    pub fn info(&self) -> ArchiveResult<ArchiveInfo> {
        let contents = self.reader().contents()?;
        let sections = self
            .sections
            .iter()
            .flat_map(|map| map.entries.iter())
            .map(|(section, range)| SectionInfo { section: *section, start: range.start, end: range.end })
            .collect();
        Ok(ArchiveInfo {
            format_version:  self.header.format_version,
            user_version:    self.header.user_version,
            packed_integers: self.header.packed_integers(),
            legacy:          self.is_legacy(),
            total_bytes:     self.bytes.len(),
            sections,
            blocks:          contents.blocks.len(),
            objects:         contents.blocks.iter().filter(|b| b.block.defined_obj().is_some()).count(),
            types:           contents.types.len(),
            keys:            contents.keys.len(),
        })
    }

    pub fn dump(&self, options: &DumpOptions) -> ArchiveResult<String> {
        let contents = self.reader().contents()?;
        dump::render(&contents, options)
    }
}

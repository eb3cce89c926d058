//! Archive framing engine: writer and reader.
//!
//! # Writer
//! [`ArchiveWriter`] writes the header, reserves the section map at its final
//! size, and hands out the body buffer to the graph encoder.  On
//! [`finish`](ArchiveWriter::finish) the type and key tables are appended
//! (ids are interned lazily, so they are only complete once the body is) and
//! the reserved map is overwritten in place with the real ranges.
//!
//! # Reader (sectioned path)
//! [`ArchiveReader`] validates the header and section map up front, then
//! opens one bounded cursor per section.  A read that runs past its
//! section's end fails even if the archive has more bytes after it.
//!
//! # Reader (legacy path)
//! Archives older than [`SECTIONS_VERSION`] have no section map.  Their
//! records are classified by [`crate::recovery::scan_legacy`] instead.
//!
//! # Pass 1
//! [`ArchiveReader::linearize`] turns the body into a flat list of
//! [`LinearBlock`]s, each remembering where the next block begins so a
//! `Bin*` payload can be skipped without being parsed.

use std::ops::Range;

use crate::block::Block;
use crate::codec::{ByteReader, ByteWriter, Reservation};
use crate::error::{ArchiveError, ArchiveResult};
use crate::index::{KeyTable, TypeTable};
use crate::recovery::scan_legacy;
use crate::superblock::{Section, SectionMap, Superblock, HEADER_SIZE, SECTIONS_VERSION};

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ArchiveWriter {
    out:        ByteWriter,
    pub header: Superblock,
    map_slot:   Reservation,
    body_start: usize,
}

impl ArchiveWriter {
    pub fn new(user_version: u32, packed_integers: bool) -> Self {
        let header = Superblock::new(user_version, packed_integers);
        let mut out = ByteWriter::with_capacity(4096);
        header.write(&mut out);
        let map_slot = out.reserve(SectionMap::encoded_len(Section::ALL.len()));
        let body_start = out.len();
        Self { out, header, map_slot, body_start }
    }

    /// The body buffer.  Offsets into it are absolute archive offsets.
    pub fn body(&mut self) -> &mut ByteWriter {
        &mut self.out
    }

    pub fn body_len(&self) -> usize {
        self.out.len() - self.body_start
    }

    /// Append both tables and backpatch the section map.  Consumes the
    /// writer; the returned bytes are the complete archive.
    pub fn finish(mut self, types: &TypeTable, keys: &KeyTable) -> ArchiveResult<Vec<u8>> {
        let mut map = SectionMap::default();
        let body_end = self.out.len();
        map.insert(Section::Body, self.body_start as u64..body_end as u64);

        let types_start = self.out.len();
        types.write(&mut self.out)?;
        map.insert(Section::TypeTable, types_start as u64..self.out.len() as u64);

        let keys_start = self.out.len();
        keys.write(&mut self.out)?;
        map.insert(Section::KeyTable, keys_start as u64..self.out.len() as u64);

        self.out.fill(self.map_slot, &map.to_bytes())?;

        tracing::debug!(
            body_bytes = body_end - self.body_start,
            types = types.len(),
            keys = keys.len(),
            total = self.out.len(),
            "archive written"
        );
        Ok(self.out.into_inner())
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// One body block plus where it starts and where the next one begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearBlock {
    pub block:  Block,
    pub offset: u64,
    pub next:   u64,
}

/// Everything pass 1 extracts from an archive.
#[derive(Debug, Clone)]
pub struct Contents<'a> {
    pub data:   &'a [u8],
    pub header: Superblock,
    pub blocks: Vec<LinearBlock>,
    pub types:  TypeTable,
    pub keys:   KeyTable,
}

#[derive(Debug, Clone)]
pub struct ArchiveReader<'a> {
    data:         &'a [u8],
    pub header:   Superblock,
    /// `None` for legacy archives.
    pub sections: Option<SectionMap>,
}

impl<'a> ArchiveReader<'a> {
    /// Validate the header and, for sectioned archives, the section map.
    pub fn open(data: &'a [u8]) -> ArchiveResult<Self> {
        let mut reader = ByteReader::new(data);
        let header = Superblock::read(&mut reader)?;
        let sections = if header.format_version >= SECTIONS_VERSION {
            Some(SectionMap::read(&mut reader, data.len() as u64)?)
        } else {
            tracing::debug!(version = header.format_version, "legacy archive, no section map");
            None
        };
        Ok(Self { data, header, sections })
    }

    /// Reader over an archive whose header and section map were already
    /// validated by [`open`](Self::open).
    pub(crate) fn from_parts(data: &'a [u8], header: Superblock, sections: Option<SectionMap>) -> Self {
        Self { data, header, sections }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn is_legacy(&self) -> bool {
        self.sections.is_none()
    }

    /// Byte range of `section`, or `None` for legacy archives.
    pub fn section_range(&self, section: Section) -> Option<Range<usize>> {
        let range = self.sections.as_ref()?.get(section)?;
        // Ranges were checked against the archive length in `SectionMap::read`.
        Some(range.start as usize..range.end as usize)
    }

    /// A cursor that cannot leave `section`.
    pub fn section(&self, section: Section) -> ArchiveResult<ByteReader<'a>> {
        let range = self.section_range(section).ok_or(ArchiveError::MissingSection(section))?;
        Ok(ByteReader::window(self.data, range)?)
    }

    /// The type table alone, without touching the body.  Legacy archives
    /// have no table section, so the whole record stream is scanned.
    pub fn read_types(&self) -> ArchiveResult<TypeTable> {
        if self.is_legacy() {
            return Ok(scan_legacy(self.data, HEADER_SIZE)?.types);
        }
        let mut reader = self.section(Section::TypeTable)?;
        let table = TypeTable::read(&mut reader)?;
        expect_consumed(Section::TypeTable, &reader)?;
        Ok(table)
    }

    pub fn read_keys(&self) -> ArchiveResult<KeyTable> {
        if self.is_legacy() {
            return Ok(scan_legacy(self.data, HEADER_SIZE)?.keys);
        }
        let mut reader = self.section(Section::KeyTable)?;
        let table = KeyTable::read(&mut reader)?;
        expect_consumed(Section::KeyTable, &reader)?;
        Ok(table)
    }

    /// Pass 1: the body as a flat, ordered block list.
    pub fn linearize(&self) -> ArchiveResult<Vec<LinearBlock>> {
        if self.is_legacy() {
            return Ok(scan_legacy(self.data, HEADER_SIZE)?.blocks);
        }
        let reader = self.section(Section::Body)?;
        linearize_body(reader)
    }

    /// Tables and block list in one go.  Legacy archives are scanned once.
    pub fn contents(&self) -> ArchiveResult<Contents<'a>> {
        let (blocks, types, keys) = if self.is_legacy() {
            let scan = scan_legacy(self.data, HEADER_SIZE)?;
            (scan.blocks, scan.types, scan.keys)
        } else {
            (self.linearize()?, self.read_types()?, self.read_keys()?)
        };
        tracing::debug!(
            blocks = blocks.len(),
            types = types.len(),
            keys = keys.len(),
            legacy = self.is_legacy(),
            "archive read"
        );
        Ok(Contents { data: self.data, header: self.header, blocks, types, keys })
    }
}

pub(crate) fn linearize_body(mut reader: ByteReader<'_>) -> ArchiveResult<Vec<LinearBlock>> {
    let mut blocks = Vec::new();
    while !reader.is_empty() {
        let offset = reader.position();
        let block = Block::read(&mut reader)?;
        let next = reader.position();
        tracing::trace!(offset, tag = block.tag().name(), "block");
        blocks.push(LinearBlock { block, offset, next });
    }
    Ok(blocks)
}

fn expect_consumed(section: Section, reader: &ByteReader<'_>) -> ArchiveResult<()> {
    match reader.remaining() {
        0 => Ok(()),
        trailing => Err(ArchiveError::TrailingSectionBytes { section, trailing }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{KeyId, ObjId};
    use crate::codec::CodecError;
    use crate::index::TypeEntry;

    fn sample() -> Vec<u8> {
        let mut writer = ArchiveWriter::new(5, true);
        let mut keys = KeyTable::default();
        let name = keys.intern("name");
        Block::IdValue(KeyId::POSITIONAL, ObjId(0)).write_head(writer.body());
        Block::BinValue(name, 0..0).write(writer.body(), b"abc");
        Block::End.write_head(writer.body());
        let mut types = TypeTable::default();
        types.insert(TypeEntry { id: 0, name: "demo::Thing".into(), version: 1 }).unwrap();
        writer.finish(&types, &keys).unwrap()
    }

    #[test]
    fn writer_backpatches_section_map() {
        let bytes = sample();
        let reader = ArchiveReader::open(&bytes).unwrap();
        assert_eq!(reader.header.user_version, 5);
        let body = reader.section_range(Section::Body).unwrap();
        assert_eq!(body.start, HEADER_SIZE + SectionMap::encoded_len(3));
        assert_eq!(reader.read_types().unwrap().len(), 1);
        assert_eq!(reader.read_keys().unwrap().id("name"), Some(KeyId(1)));
    }

    #[test]
    fn linearize_records_next_offsets() {
        let bytes = sample();
        let reader = ArchiveReader::open(&bytes).unwrap();
        let blocks = reader.linearize().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].next, blocks[1].offset);
        let payload = blocks[1].block.payload().unwrap();
        assert_eq!(&bytes[payload.clone()], b"abc");
        assert_eq!(blocks[1].next as usize, payload.end);
    }

    #[test]
    fn section_cursor_is_bounded() {
        let bytes = sample();
        let reader = ArchiveReader::open(&bytes).unwrap();
        let mut body = reader.section(Section::Body).unwrap();
        let len = body.remaining();
        body.skip(len).unwrap();
        // More bytes follow in the archive, but not in this section.
        assert!(matches!(body.read_u8(), Err(CodecError::OutOfBounds { .. })));
    }

    #[test]
    fn trailing_table_bytes_are_rejected() {
        let mut writer = ArchiveWriter::new(0, true);
        Block::Nil(KeyId::POSITIONAL).write_head(writer.body());
        let mut bytes = writer.finish(&TypeTable::default(), &KeyTable::default()).unwrap();
        // Grow the key table section by one stray byte.
        let reader = ArchiveReader::open(&bytes).unwrap();
        let keys = reader.section_range(Section::KeyTable).unwrap();
        bytes.push(0xFF);
        let map_at = HEADER_SIZE + 2 + 2 * crate::superblock::SECTION_ENTRY_SIZE;
        let end = (keys.end + 1) as u64;
        bytes[map_at + 10..map_at + 18].copy_from_slice(&end.to_le_bytes());
        let reader = ArchiveReader::open(&bytes).unwrap();
        assert!(matches!(
            reader.read_keys(),
            Err(ArchiveError::TrailingSectionBytes { section: Section::KeyTable, trailing: 1 })
        ));
    }
}

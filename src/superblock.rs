//! Archive header and section map.
//!
//! ```text
//! offset  size  field
//!      0     8  magic           "GRAPHARK"
//!      8     4  format_version  LE u32
//!     12     4  user_version    LE u32 (opaque to this crate)
//!     16     4  flags           LE u32 (bit 0: integers are varint packed)
//!     20     4  reserved        zero
//!     24     2  section count   LE u16        ┐
//!     26    18  (tag u16, start u64, end u64) │ version >= SECTIONS_VERSION
//!    ...                                      ┘
//! ```
//!
//! The section map is written as a zeroed placeholder of its final size,
//! then overwritten once the body and tables have been appended.

use serde::Serialize;

use crate::codec::{ByteReader, ByteWriter};
use crate::error::{ArchiveError, ArchiveResult};

pub const MAGIC: &[u8; 8] = b"GRAPHARK";
/// Current format version written by this build.
pub const FORMAT_VERSION: u32 = 2;
/// First version carrying a section map.  Older archives use the legacy
/// frameless layout (see [`crate::recovery`]).
pub const SECTIONS_VERSION: u32 = 2;
/// Oldest version this build can read.
pub const LEGACY_VERSION: u32 = 1;

pub const HEADER_SIZE: usize = 24;
pub const SECTION_ENTRY_SIZE: usize = 18;

pub const FLAG_PACKED_INTEGERS: u32 = 1 << 0;

// ── Header ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Superblock {
    pub format_version: u32,
    pub user_version:   u32,
    pub flags:          u32,
}

impl Superblock {
    pub fn new(user_version: u32, packed_integers: bool) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            user_version,
            flags: if packed_integers { FLAG_PACKED_INTEGERS } else { 0 },
        }
    }

    pub fn packed_integers(&self) -> bool {
        self.flags & FLAG_PACKED_INTEGERS != 0
    }

    pub fn has_sections(&self) -> bool {
        self.format_version >= SECTIONS_VERSION
    }

    pub fn write(&self, writer: &mut ByteWriter) {
        writer.write_raw(MAGIC);
        writer.write_u32(self.format_version);
        writer.write_u32(self.user_version);
        writer.write_u32(self.flags);
        writer.write_u32(0);
    }

    /// Read and validate magic and version gate.
    pub fn read(reader: &mut ByteReader<'_>) -> ArchiveResult<Self> {
        let mut magic = [0u8; 8];
        for byte in magic.iter_mut() {
            *byte = reader.read_u8()?;
        }
        if &magic != MAGIC {
            return Err(ArchiveError::InvalidMagic {
                expected: hex::encode(MAGIC),
                actual:   hex::encode(magic),
            });
        }
        let format_version = reader.read_u32()?;
        if !(LEGACY_VERSION..=FORMAT_VERSION).contains(&format_version) {
            return Err(ArchiveError::UnsupportedVersion(format_version));
        }
        let user_version = reader.read_u32()?;
        let flags = reader.read_u32()?;
        let _reserved = reader.read_u32()?;
        Ok(Self { format_version, user_version, flags })
    }
}

// ── Sections ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Section {
    Body,
    TypeTable,
    KeyTable,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Body, Section::TypeTable, Section::KeyTable];

    pub fn tag(self) -> u16 {
        match self {
            Section::Body      => 1,
            Section::TypeTable => 2,
            Section::KeyTable  => 3,
        }
    }

    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            1 => Some(Section::Body),
            2 => Some(Section::TypeTable),
            3 => Some(Section::KeyTable),
            _ => None,
        }
    }
}

/// Byte ranges of every section, as absolute archive offsets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SectionMap {
    pub entries: Vec<(Section, std::ops::Range<u64>)>,
}

impl SectionMap {
    /// Encoded size of a map with `count` entries.
    pub fn encoded_len(count: usize) -> usize {
        2 + count * SECTION_ENTRY_SIZE
    }

    pub fn insert(&mut self, section: Section, range: std::ops::Range<u64>) {
        self.entries.retain(|(s, _)| *s != section);
        self.entries.push((section, range));
    }

    pub fn get(&self, section: Section) -> Option<std::ops::Range<u64>> {
        self.entries.iter().find(|(s, _)| *s == section).map(|(_, r)| r.clone())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(Self::encoded_len(self.entries.len()));
        w.write_u16(self.entries.len() as u16);
        for (section, range) in &self.entries {
            w.write_u16(section.tag());
            w.write_u64(range.start);
            w.write_u64(range.end);
        }
        w.into_inner()
    }

    /// Read the map and validate every range against an archive of
    /// `archive_len` bytes.  Unknown section tags are skipped.
    pub fn read(reader: &mut ByteReader<'_>, archive_len: u64) -> ArchiveResult<Self> {
        let count = reader.read_u16()?;
        let mut map = SectionMap::default();
        for _ in 0..count {
            let tag = reader.read_u16()?;
            let start = reader.read_u64()?;
            let end = reader.read_u64()?;
            let Some(section) = Section::from_tag(tag) else {
                tracing::warn!(tag, start, end, "skipping unknown section");
                continue;
            };
            if map.get(section).is_some() {
                return Err(ArchiveError::DuplicateSection(section));
            }
            map.entries.push((section, start..end));
        }

        let floor = reader.position();
        for (section, range) in &map.entries {
            if range.start > range.end || range.start < floor || range.end > archive_len {
                return Err(ArchiveError::SectionOutOfRange {
                    section: *section,
                    start:   range.start,
                    end:     range.end,
                    len:     archive_len,
                });
            }
        }
        for section in Section::ALL {
            if map.get(section).is_none() {
                return Err(ArchiveError::MissingSection(section));
            }
        }
        let mut sorted = map.entries.clone();
        sorted.sort_by_key(|(_, r)| (r.start, r.end));
        for pair in sorted.windows(2) {
            if pair[0].1.end > pair[1].1.start {
                return Err(ArchiveError::OverlappingSections { first: pair[0].0, second: pair[1].0 });
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(version: u32) -> Vec<u8> {
        let mut w = ByteWriter::new();
        Superblock { format_version: version, user_version: 7, flags: 1 }.write(&mut w);
        w.into_inner()
    }

    #[test]
    fn header_roundtrip() {
        let bytes = header_bytes(FORMAT_VERSION);
        assert_eq!(bytes.len(), HEADER_SIZE);
        let sb = Superblock::read(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(sb.user_version, 7);
        assert!(sb.packed_integers());
        assert!(sb.has_sections());
    }

    #[test]
    fn bad_magic() {
        let mut bytes = header_bytes(FORMAT_VERSION);
        bytes[0] = b'X';
        let err = Superblock::read(&mut ByteReader::new(&bytes)).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidMagic { .. }));
    }

    #[test]
    fn version_gate() {
        for version in [0, FORMAT_VERSION + 1] {
            let bytes = header_bytes(version);
            let err = Superblock::read(&mut ByteReader::new(&bytes)).unwrap_err();
            assert!(matches!(err, ArchiveError::UnsupportedVersion(v) if v == version));
        }
        let legacy = Superblock::read(&mut ByteReader::new(&header_bytes(LEGACY_VERSION))).unwrap();
        assert!(!legacy.has_sections());
    }

    fn map_bytes(entries: &[(u16, u64, u64)]) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_u16(entries.len() as u16);
        for &(tag, start, end) in entries {
            w.write_u16(tag);
            w.write_u64(start);
            w.write_u64(end);
        }
        w.into_inner()
    }

    #[test]
    fn section_map_roundtrip_skips_unknown_tags() {
        let bytes = map_bytes(&[(1, 100, 150), (9, 0, 0), (2, 150, 160), (3, 160, 170)]);
        let map = SectionMap::read(&mut ByteReader::new(&bytes), 170).unwrap();
        assert_eq!(map.entries.len(), 3);
        assert_eq!(map.get(Section::TypeTable), Some(150..160));
    }

    #[test]
    fn section_map_rejects_overlap_and_missing() {
        let overlap = map_bytes(&[(1, 100, 155), (2, 150, 160), (3, 160, 170)]);
        assert!(matches!(
            SectionMap::read(&mut ByteReader::new(&overlap), 170),
            Err(ArchiveError::OverlappingSections { .. })
        ));
        let missing = map_bytes(&[(1, 100, 150), (2, 150, 160)]);
        assert!(matches!(
            SectionMap::read(&mut ByteReader::new(&missing), 170),
            Err(ArchiveError::MissingSection(Section::KeyTable))
        ));
        let outside = map_bytes(&[(1, 100, 150), (2, 150, 160), (3, 160, 999)]);
        assert!(matches!(
            SectionMap::read(&mut ByteReader::new(&outside), 170),
            Err(ArchiveError::SectionOutOfRange { section: Section::KeyTable, .. })
        ));
    }

    #[test]
    fn encoded_len_matches() {
        let mut map = SectionMap::default();
        for s in Section::ALL {
            map.insert(s, 0..0);
        }
        assert_eq!(map.to_bytes().len(), SectionMap::encoded_len(3));
    }
}

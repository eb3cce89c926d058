//! Legacy frameless scanner.
//!
//! # Layout
//!
//! Version 1 archives have no section map.  The header is followed by one
//! undifferentiated record stream that runs to the end of the file:
//!
//! | Tag | Record |
//! |-----|--------|
//! | `0x01..=0x0C` | body block (same encoding as the sectioned body) |
//! | `0xE0` | type record: `type_id:varint, name:cstr, version:varint` |
//! | `0xE1` | key record: `key_id:varint, name:cstr` |
//!
//! Records are classified by their leading tag alone.  Table records may
//! appear anywhere, interleaved with blocks; their order does not affect
//! the body.  Any other tag stops the scan with a structural error.
//!
//! This is a compatibility path: it accepts every well-formed version 1
//! archive, but on malformed input it only promises to fail, not to
//! pinpoint the first bad record.

use crate::block::{Block, BlockTag, KeyId};
use crate::codec::ByteReader;
use crate::error::{ArchiveError, ArchiveResult};
use crate::index::{read_key_entry, read_type_entry, KeyTable, TypeEntry, TypeTable};
use crate::io_stream::LinearBlock;

pub const TYPE_RECORD: u8 = 0xE0;
pub const KEY_RECORD:  u8 = 0xE1;

// ── Types ─────────────────────────────────────────────────────────────────────

/// One classified legacy record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyRecord {
    Block(LinearBlock),
    Type(TypeEntry),
    Key(KeyId, String),
}

/// Result of a full legacy scan.
#[derive(Debug, Clone, Default)]
pub struct LegacyScan {
    pub blocks: Vec<LinearBlock>,
    pub types:  TypeTable,
    pub keys:   KeyTable,
}

// ── Scanner ───────────────────────────────────────────────────────────────────

/// Classify every record from `start` to the end of `data`.
pub fn scan_records(data: &[u8], start: usize) -> ArchiveResult<Vec<LegacyRecord>> {
    let mut reader = ByteReader::window(data, start..data.len())?;
    let mut records = Vec::new();
    while !reader.is_empty() {
        let offset = reader.position();
        let tag = reader.read_u8()?;
        let record = match tag {
            TYPE_RECORD => LegacyRecord::Type(read_type_entry(&mut reader)?),
            KEY_RECORD => {
                let (id, name) = read_key_entry(&mut reader)?;
                LegacyRecord::Key(id, name)
            }
            _ => {
                let tag = BlockTag::from_u8(tag).ok_or(ArchiveError::UnknownBlockTag { tag, offset })?;
                let block = Block::read_body(tag, &mut reader)?;
                LegacyRecord::Block(LinearBlock { block, offset, next: reader.position() })
            }
        };
        records.push(record);
    }
    Ok(records)
}

/// Scan and sort records into a block list and the two tables.
pub fn scan_legacy(data: &[u8], start: usize) -> ArchiveResult<LegacyScan> {
    let mut scan = LegacyScan::default();
    for record in scan_records(data, start)? {
        match record {
            LegacyRecord::Block(block) => scan.blocks.push(block),
            LegacyRecord::Type(entry) => scan.types.insert(entry)?,
            LegacyRecord::Key(id, name) => scan.keys.insert(id, name)?,
        }
    }
    tracing::debug!(
        blocks = scan.blocks.len(),
        types = scan.types.len(),
        keys = scan.keys.len(),
        "legacy scan complete"
    );
    Ok(scan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ObjId, TypeId};
    use crate::codec::ByteWriter;

    fn legacy_stream() -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.write_u8(KEY_RECORD);
        w.write_uvarint(1);
        w.write_cstr("label").unwrap();
        Block::IdRef(KeyId::POSITIONAL, TypeId(0), ObjId(0)).write_head(&mut w);
        Block::BinValue(KeyId(1), 0..0).write(&mut w, b"hi");
        Block::End.write_head(&mut w);
        w.write_u8(TYPE_RECORD);
        w.write_uvarint(0);
        w.write_cstr("old::Thing").unwrap();
        w.write_uvarint(3);
        w.into_inner()
    }

    #[test]
    fn records_are_classified_by_tag() {
        let bytes = legacy_stream();
        let records = scan_records(&bytes, 0).unwrap();
        assert_eq!(records.len(), 5);
        assert!(matches!(records[0], LegacyRecord::Key(KeyId(1), _)));
        assert!(matches!(records[4], LegacyRecord::Type(TypeEntry { version: 3, .. })));
    }

    #[test]
    fn tables_may_trail_the_body() {
        let bytes = legacy_stream();
        let scan = scan_legacy(&bytes, 0).unwrap();
        assert_eq!(scan.blocks.len(), 3);
        assert_eq!(scan.types.get(TypeId(0)).map(|t| t.name.as_str()), Some("old::Thing"));
        assert_eq!(scan.keys.name(KeyId(1)), Some("label"));
    }

    #[test]
    fn unknown_record_tag_stops_the_scan() {
        let mut bytes = legacy_stream();
        bytes.push(0x7F);
        let at = (bytes.len() - 1) as u64;
        assert!(matches!(
            scan_legacy(&bytes, 0),
            Err(ArchiveError::UnknownBlockTag { tag: 0x7F, offset }) if offset == at
        ));
    }

    #[test]
    fn duplicate_type_record_is_structural() {
        let mut bytes = legacy_stream();
        bytes.extend_from_slice(&[TYPE_RECORD, 0, b'x', 0, 0]);
        assert!(matches!(scan_legacy(&bytes, 0), Err(ArchiveError::DuplicateTableEntry { table: "type", .. })));
    }
}

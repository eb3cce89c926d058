//! Type and key tables.
//!
//! Both are interned lazily while the body is written and appended once, at
//! the end, as their own sections:
//!
//! ```text
//! TypeTable: count:varint, (type_id:varint, name:cstr, version:varint)*
//! KeyTable:  count:varint, (key_id:varint,  name:cstr)*
//! ```

use std::collections::HashMap;

use serde::Serialize;

use crate::block::{read_id, KeyId, TypeId};
use crate::codec::{ByteReader, ByteWriter};
use crate::error::{ArchiveError, ArchiveResult};

// ── Type table ───────────────────────────────────────────────────────────────

/// One persisted type: the name it was encoded under and its schema version
/// at encode time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeEntry {
    pub id:      u32,
    pub name:    String,
    pub version: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeTable {
    entries: Vec<TypeEntry>,
    by_id:   HashMap<TypeId, usize>,
}

impl TypeTable {
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn entries(&self) -> &[TypeEntry] { &self.entries }

    pub fn get(&self, id: TypeId) -> Option<&TypeEntry> {
        self.by_id.get(&id).map(|&i| &self.entries[i])
    }

    /// Add an entry; a repeated id is a structural error.
    pub fn insert(&mut self, entry: TypeEntry) -> ArchiveResult<()> {
        let id = TypeId(entry.id);
        if self.by_id.contains_key(&id) {
            return Err(ArchiveError::DuplicateTableEntry { table: "type", id: entry.id });
        }
        self.by_id.insert(id, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn write(&self, writer: &mut ByteWriter) -> ArchiveResult<()> {
        writer.write_uvarint(self.entries.len() as u64);
        for entry in &self.entries {
            write_type_entry(writer, entry)?;
        }
        Ok(())
    }

    pub fn read(reader: &mut ByteReader<'_>) -> ArchiveResult<Self> {
        let count = reader.read_len()?;
        let mut table = TypeTable::default();
        for _ in 0..count {
            table.insert(read_type_entry(reader)?)?;
        }
        Ok(table)
    }
}

pub(crate) fn write_type_entry(writer: &mut ByteWriter, entry: &TypeEntry) -> ArchiveResult<()> {
    writer.write_uvarint(u64::from(entry.id));
    writer.write_cstr(&entry.name)?;
    writer.write_uvarint(u64::from(entry.version));
    Ok(())
}

pub(crate) fn read_type_entry(reader: &mut ByteReader<'_>) -> ArchiveResult<TypeEntry> {
    let id = read_id(reader)?;
    let name = reader.read_cstr()?.to_owned();
    let version = read_id(reader)?;
    Ok(TypeEntry { id, name, version })
}

// ── Key table ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyTable {
    names:   Vec<(KeyId, String)>,
    by_name: HashMap<String, KeyId>,
    by_id:   HashMap<KeyId, usize>,
}

impl KeyTable {
    pub fn len(&self) -> usize { self.names.len() }
    pub fn is_empty(&self) -> bool { self.names.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, &str)> {
        self.names.iter().map(|(id, name)| (*id, name.as_str()))
    }

    /// Id for `name`, allocating the next one on first use.  Ids start at 1;
    /// 0 is reserved for positional values.
    pub fn intern(&mut self, name: &str) -> KeyId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = KeyId(self.names.len() as u32 + 1);
        // Interned ids are dense, so a fresh id can never collide.
        self.by_id.insert(id, self.names.len());
        self.by_name.insert(name.to_owned(), id);
        self.names.push((id, name.to_owned()));
        id
    }

    pub fn insert(&mut self, id: KeyId, name: String) -> ArchiveResult<()> {
        if id.is_positional() || self.by_id.contains_key(&id) {
            return Err(ArchiveError::DuplicateTableEntry { table: "key", id: id.0 });
        }
        self.by_id.insert(id, self.names.len());
        self.by_name.entry(name.clone()).or_insert(id);
        self.names.push((id, name));
        Ok(())
    }

    pub fn id(&self, name: &str) -> Option<KeyId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: KeyId) -> Option<&str> {
        self.by_id.get(&id).map(|&i| self.names[i].1.as_str())
    }

    /// Display form of a key: its name, or `#n` for positional values.
    pub fn describe(&self, id: KeyId) -> String {
        match self.name(id) {
            Some(name) => name.to_owned(),
            None if id.is_positional() => "<positional>".to_owned(),
            None => id.to_string(),
        }
    }

    pub fn write(&self, writer: &mut ByteWriter) -> ArchiveResult<()> {
        writer.write_uvarint(self.names.len() as u64);
        for (id, name) in &self.names {
            write_key_entry(writer, *id, name)?;
        }
        Ok(())
    }

    pub fn read(reader: &mut ByteReader<'_>) -> ArchiveResult<Self> {
        let count = reader.read_len()?;
        let mut table = KeyTable::default();
        for _ in 0..count {
            let (id, name) = read_key_entry(reader)?;
            table.insert(id, name)?;
        }
        Ok(table)
    }
}

pub(crate) fn write_key_entry(writer: &mut ByteWriter, id: KeyId, name: &str) -> ArchiveResult<()> {
    writer.write_uvarint(u64::from(id.0));
    writer.write_cstr(name)?;
    Ok(())
}

pub(crate) fn read_key_entry(reader: &mut ByteReader<'_>) -> ArchiveResult<(KeyId, String)> {
    let id = KeyId(read_id(reader)?);
    let name = reader.read_cstr()?.to_owned();
    Ok((id, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_interning_is_stable() {
        let mut keys = KeyTable::default();
        let a = keys.intern("a");
        let b = keys.intern("b");
        assert_eq!(keys.intern("a"), a);
        assert_eq!((a, b), (KeyId(1), KeyId(2)));
        assert_eq!(keys.name(b), Some("b"));
        assert_eq!(keys.describe(KeyId::POSITIONAL), "<positional>");
    }

    #[test]
    fn tables_roundtrip() {
        let mut types = TypeTable::default();
        types.insert(TypeEntry { id: 0, name: "shapes::Circle".into(), version: 2 }).unwrap();
        types.insert(TypeEntry { id: 1, name: "shapes::Square".into(), version: 0 }).unwrap();
        let mut keys = KeyTable::default();
        keys.intern("radius");

        let mut w = ByteWriter::new();
        types.write(&mut w).unwrap();
        keys.write(&mut w).unwrap();
        let bytes = w.into_inner();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(TypeTable::read(&mut r).unwrap(), types);
        let keys_back = KeyTable::read(&mut r).unwrap();
        assert_eq!(keys_back.id("radius"), Some(KeyId(1)));
        assert!(r.is_empty());
    }

    #[test]
    fn duplicate_type_id_is_rejected() {
        let mut types = TypeTable::default();
        types.insert(TypeEntry { id: 3, name: "A".into(), version: 0 }).unwrap();
        let err = types.insert(TypeEntry { id: 3, name: "B".into(), version: 0 }).unwrap_err();
        assert!(matches!(err, ArchiveError::DuplicateTableEntry { table: "type", id: 3 }));
    }

    #[test]
    fn positional_key_id_cannot_be_named() {
        let mut keys = KeyTable::default();
        assert!(keys.insert(KeyId::POSITIONAL, "x".into()).is_err());
    }
}

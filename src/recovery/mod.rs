//! Read path for archives written before the section map existed.

pub mod scanner;

pub use scanner::{scan_legacy, scan_records, LegacyRecord, LegacyScan, KEY_RECORD, TYPE_RECORD};

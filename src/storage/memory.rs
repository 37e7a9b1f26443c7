use std::collections::HashMap;
use std::io;

use itertools::Itertools;

use super::{record_not_found, Store, Tag};

/// In-memory storage implementation for the interpreter.
///
/// Backs a whole card session in a `HashMap`; the positional variants are
/// overridden to patch records in place instead of rewriting them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryStorage {
    records: HashMap<Tag, Vec<u8>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Iterate records sorted by tag, mostly useful in diagnostics and
    /// tests.
    pub fn records(&self) -> impl Iterator<Item = (&Tag, &[u8])> {
        self.records
            .iter()
            .sorted_by_key(|(tag, _)| *tag)
            .map(|(tag, data)| (tag, data.as_slice()))
    }

    fn patch(&mut self, tag: &Tag, at: usize, bytes: &[u8]) -> io::Result<()> {
        let record = self.records.get_mut(tag).ok_or_else(record_not_found)?;

        if at + bytes.len() > record.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "positional write past record end",
            ));
        }

        record[at..at + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl Store for MemoryStorage {
    fn length(&self, tag: &Tag) -> io::Result<u32> {
        self.records
            .get(tag)
            .map(|r| r.len() as u32)
            .ok_or_else(record_not_found)
    }

    fn read_in_place(&self, tag: &Tag) -> io::Result<&[u8]> {
        self.records
            .get(tag)
            .map(Vec::as_slice)
            .ok_or_else(record_not_found)
    }

    fn read(&self, tag: &Tag, dst: &mut [u8]) -> io::Result<usize> {
        let record = self.read_in_place(tag)?;
        let len = record.len().min(dst.len());
        dst[..len].copy_from_slice(&record[..len]);
        Ok(len)
    }

    fn write(&mut self, tag: &Tag, src: &[u8]) -> io::Result<()> {
        self.records.insert(*tag, src.to_vec());
        Ok(())
    }

    fn write_1b_at(&mut self, tag: &Tag, index: u16, value: u8) -> io::Result<()> {
        let at = super::element_offset(self.read_in_place(tag)?, index, 1)?;
        self.patch(tag, at, &[value])
    }

    fn write_2b_at(&mut self, tag: &Tag, index: u16, value: u16) -> io::Result<()> {
        let at = super::element_offset(self.read_in_place(tag)?, index, 2)?;
        self.patch(tag, at, &value.to_be_bytes())
    }

    fn write_4b_at(&mut self, tag: &Tag, index: u16, value: u32) -> io::Result<()> {
        let at = super::element_offset(self.read_in_place(tag)?, index, 4)?;
        self.patch(tag, at, &value.to_be_bytes())
    }
}

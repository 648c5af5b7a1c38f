//! Page management for stratadb
//!
//! Each page is a fixed 4 KiB buffer holding a chain of length-prefixed row
//! records terminated by a zero-length sentinel. Pages are the unit of disk
//! I/O: one page maps to one `<table>_page_<id>.bin` file.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use super::row::{Row, LEN_WIDTH};
use crate::error::Result;

/// Page size in bytes (4 KiB)
pub const PAGE_SIZE: usize = 4096;

/// A fixed-size data page
///
/// The stored length of each record counts its own 8-byte prefix
/// (`payload_len + 8`), and the record chain advances by `8 + stored_len`
/// per record. Both quirks are part of the on-disk format and must not be
/// "fixed": existing page files depend on them.
#[derive(Debug)]
pub struct Page {
    id: u64,
    data: Vec<u8>,
    dirty: bool,
}

impl Page {
    /// Create a new zeroed page
    pub fn new(id: u64) -> Self {
        Self {
            id,
            data: vec![0u8; PAGE_SIZE],
            dirty: false,
        }
    }

    /// Get page ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Check if page has unflushed mutations
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Force the page to be written on the next flush even without a record
    /// mutation (used when a page is rebuilt from scratch).
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// File name of this page for the given table
    pub fn file_name(table: &str, page_id: u64) -> String {
        format!("{}_page_{}.bin", table, page_id)
    }

    fn read_len(&self, pos: usize) -> usize {
        let mut buf = [0u8; LEN_WIDTH];
        buf.copy_from_slice(&self.data[pos..pos + LEN_WIDTH]);
        u64::from_le_bytes(buf) as usize
    }

    /// Insert a row record at the first free slot.
    ///
    /// Returns `false` when the page cannot hold the record.
    pub fn insert_row(&mut self, row: &Row) -> bool {
        let payload = row.serialize();
        let record_len = payload.len() + LEN_WIDTH;

        // Walk the record chain to the zero-length sentinel.
        let mut pos = 0;
        while pos + LEN_WIDTH <= PAGE_SIZE {
            let existing = self.read_len(pos);
            if existing == 0 {
                break;
            }
            pos = pos.saturating_add(LEN_WIDTH + existing);
        }

        if pos.saturating_add(record_len) > PAGE_SIZE {
            return false;
        }

        self.data[pos..pos + LEN_WIDTH].copy_from_slice(&(record_len as u64).to_le_bytes());
        self.data[pos + LEN_WIDTH..pos + LEN_WIDTH + payload.len()].copy_from_slice(&payload);
        self.dirty = true;
        true
    }

    /// Walk every record in the chain, tombstoned ones included, returning
    /// each with the offset of its length prefix.
    pub(crate) fn records(&self) -> Result<Vec<(usize, Row)>> {
        let mut out = Vec::new();
        let mut pos = 0;

        while pos + LEN_WIDTH <= PAGE_SIZE {
            let stored = self.read_len(pos);
            if stored == 0 {
                break;
            }
            let start = pos + LEN_WIDTH;
            if start >= PAGE_SIZE {
                break;
            }
            // The stored length overshoots the payload by one prefix width;
            // clamp so the tail of the page is never read past.
            let end = start.saturating_add(stored).min(PAGE_SIZE);
            let row = Row::deserialize(&self.data[start..end])?;
            out.push((pos, row));
            pos = pos.saturating_add(LEN_WIDTH + stored);
        }
        Ok(out)
    }

    /// Read all live rows in insertion order, skipping tombstones
    pub fn rows(&self) -> Result<Vec<Row>> {
        Ok(self
            .records()?
            .into_iter()
            .filter_map(|(_, row)| (!row.is_deleted()).then_some(row))
            .collect())
    }

    /// Set the tombstone bit of the record whose length prefix starts at
    /// `offset`, leaving the record in place.
    pub(crate) fn tombstone_at(&mut self, offset: usize) {
        self.data[offset + LEN_WIDTH] = 1;
        self.dirty = true;
    }

    /// Write the full 4 KiB buffer to `<table>_page_<id>.bin`.
    ///
    /// No-op when the page is clean; clears the dirty flag on success.
    pub fn write_to_disk(&mut self, dir: &Path, table: &str) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let path = dir.join(Self::file_name(table, self.id));
        let mut file = File::create(path)?;
        file.write_all(&self.data)?;
        file.sync_all()?;
        self.dirty = false;
        Ok(())
    }

    /// Load the page from `<table>_page_<id>.bin`.
    ///
    /// Fails when the file does not exist so the caller can decide whether
    /// to create a fresh page instead.
    pub fn load_from_disk(&mut self, dir: &Path, table: &str) -> Result<()> {
        let path = dir.join(Self::file_name(table, self.id));
        let mut file = File::open(path)?;
        file.read_exact(&mut self.data)?;
        self.dirty = false;
        Ok(())
    }
}

//! Composite index for stratadb
//!
//! An ordered map from a separator-joined multi-column key to the row,
//! durable across restarts through three files per table:
//!
//! - `<table>_cidx.meta` - one line, comma-separated participating column
//!   indices; its presence is what triggers recovery
//! - `<table>_cidx.bin`  - snapshot of the whole map
//! - `<table>_cidx.wal`  - write-ahead log of upserts since the snapshot
//!
//! Snapshot and WAL share one record layout:
//! `[u32 key_len][key][u32 field_count][field_count x (u32 len, bytes)]`,
//! little-endian. A partial record at end-of-file is discarded silently;
//! that cutoff is the durability boundary.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

/// Separator joining participant values inside a composite key (U+001F)
pub const KEY_SEPARATOR: char = '\u{1f}';

/// Composite index of one table, with its durable file set
#[derive(Debug)]
pub struct CompositeIndex {
    /// Participating column indices, in declared order
    key_columns: Vec<usize>,
    /// Composite key -> full row values
    entries: BTreeMap<String, Vec<String>>,
    meta_path: PathBuf,
    snapshot_path: PathBuf,
    wal_path: PathBuf,
}

impl CompositeIndex {
    /// Create an empty index over the given column positions
    pub fn new(dir: &Path, table: &str, key_columns: Vec<usize>) -> Self {
        Self {
            key_columns,
            entries: BTreeMap::new(),
            meta_path: dir.join(format!("{}_cidx.meta", table)),
            snapshot_path: dir.join(format!("{}_cidx.bin", table)),
            wal_path: dir.join(format!("{}_cidx.wal", table)),
        }
    }

    /// Participating column indices
    pub fn key_columns(&self) -> &[usize] {
        &self.key_columns
    }

    /// Number of indexed rows
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the index holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the composite key for a row.
    ///
    /// Returns `None` when any participant is out of range of the row or
    /// empty; such rows are not indexed.
    pub fn composite_key(&self, values: &[String]) -> Option<String> {
        let mut key = String::new();
        for (i, &col) in self.key_columns.iter().enumerate() {
            let part = values.get(col).filter(|v| !v.is_empty())?;
            if i > 0 {
                key.push(KEY_SEPARATOR);
            }
            key.push_str(part);
        }
        Some(key)
    }

    /// Upsert into the in-memory map only (back-fill, WAL replay)
    pub fn upsert(&mut self, key: String, values: Vec<String>) {
        self.entries.insert(key, values);
    }

    /// Upsert and append a WAL record; the append follows the successful
    /// in-memory update.
    pub fn upsert_logged(&mut self, key: String, values: Vec<String>) -> Result<()> {
        self.entries.insert(key.clone(), values.clone());

        let mut wal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.wal_path)?;
        write_record(&mut wal, &key, &values)?;
        wal.sync_all()?;
        Ok(())
    }

    /// Remove an entry. In-memory immediate; durable at the next checkpoint
    /// (the WAL record format carries upserts only).
    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.entries.remove(key)
    }

    /// Point lookup
    pub fn get(&self, key: &str) -> Option<&Vec<String>> {
        self.entries.get(key)
    }

    /// Closed-interval range lookup in ascending key order
    pub fn range(&self, min: &str, max: &str) -> Vec<Vec<String>> {
        if min > max {
            return Vec::new();
        }
        self.entries
            .range::<str, _>((std::ops::Bound::Included(min), std::ops::Bound::Included(max)))
            .map(|(_, values)| values.clone())
            .collect()
    }

    /// Write snapshot + meta and truncate the WAL (used on enable).
    pub fn save(&self) -> Result<()> {
        self.write_snapshot()?;
        self.truncate_wal()?;

        let indices: Vec<String> = self.key_columns.iter().map(|i| i.to_string()).collect();
        let mut meta = File::create(&self.meta_path)?;
        meta.write_all(indices.join(",").as_bytes())?;
        meta.sync_all()?;
        Ok(())
    }

    /// Rewrite the snapshot from the in-memory map and truncate the WAL.
    pub fn checkpoint(&self) -> Result<()> {
        self.write_snapshot()?;
        self.truncate_wal()?;
        debug!(entries = self.entries.len(), "composite index checkpoint");
        Ok(())
    }

    fn write_snapshot(&self) -> Result<()> {
        let mut out = BufWriter::new(File::create(&self.snapshot_path)?);
        for (key, values) in &self.entries {
            write_record(&mut out, key, values)?;
        }
        out.flush()?;
        out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        Ok(())
    }

    fn truncate_wal(&self) -> Result<()> {
        File::create(&self.wal_path)?.sync_all()?;
        Ok(())
    }

    /// Load the index for `table` if its meta file exists; replays the
    /// snapshot and then the WAL.
    pub fn load(dir: &Path, table: &str) -> Result<Option<Self>> {
        let meta_path = dir.join(format!("{}_cidx.meta", table));
        if !meta_path.exists() {
            return Ok(None);
        }

        let meta = std::fs::read_to_string(&meta_path)?;
        let key_columns: Vec<usize> = meta
            .trim()
            .split(',')
            .filter_map(|tok| tok.trim().parse().ok())
            .collect();

        let mut index = Self::new(dir, table, key_columns);

        if let Ok(file) = File::open(&index.snapshot_path) {
            let mut reader = BufReader::new(file);
            while let Some((key, values)) = read_record(&mut reader) {
                index.upsert(key, values);
            }
        }
        if let Ok(file) = File::open(&index.wal_path) {
            let mut reader = BufReader::new(file);
            while let Some((key, values)) = read_record(&mut reader) {
                index.upsert(key, values);
            }
        }

        debug!(table, entries = index.entries.len(), "composite index loaded");
        Ok(Some(index))
    }

    /// Best-effort removal of the meta, snapshot, and WAL files.
    pub fn delete_files(&self) {
        for path in [&self.meta_path, &self.snapshot_path, &self.wal_path] {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn write_record(out: &mut impl Write, key: &str, values: &[String]) -> std::io::Result<()> {
    out.write_all(&(key.len() as u32).to_le_bytes())?;
    out.write_all(key.as_bytes())?;
    out.write_all(&(values.len() as u32).to_le_bytes())?;
    for value in values {
        out.write_all(&(value.len() as u32).to_le_bytes())?;
        out.write_all(value.as_bytes())?;
    }
    Ok(())
}

/// Read one record; `None` on a clean EOF or any partial/undecodable tail.
fn read_record(input: &mut impl Read) -> Option<(String, Vec<String>)> {
    let key_len = read_u32(input)?;
    let key = read_string(input, key_len as usize)?;
    let count = read_u32(input)?;
    let mut values = Vec::new();
    for _ in 0..count {
        let len = read_u32(input)?;
        values.push(read_string(input, len as usize)?);
    }
    Some((key, values))
}

fn read_u32(input: &mut impl Read) -> Option<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf).ok()?;
    Some(u32::from_le_bytes(buf))
}

fn read_string(input: &mut impl Read, len: usize) -> Option<String> {
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf).ok()?;
    String::from_utf8(buf).ok()
}

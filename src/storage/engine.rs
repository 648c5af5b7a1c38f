//! Storage engine for stratadb
//!
//! Owns the buffer cache (mapping `(table, page id)` to its `Page`), the
//! per-table max page id counters, the system catalog, both index kinds, and
//! the MVCC version store. Operators receive short-lived `&mut Page` views;
//! the cache keeps exclusive ownership of every page.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::composite_index::CompositeIndex;
use super::page::Page;
use super::primary_index::PrimaryIndex;
use crate::catalog::{SystemCatalog, TableSchema};
use crate::error::Result;
use crate::transaction::{TxId, VersionStore};

/// Storage engine: buffer cache, catalog, indexes, version store
#[derive(Debug)]
pub struct StorageEngine {
    dir: PathBuf,
    catalog: SystemCatalog,
    /// (table, page id) -> exclusively owned page
    page_cache: HashMap<(String, u64), Page>,
    /// Highest allocated data-page id per table (catalog page 0 not counted)
    max_page_ids: HashMap<String, u64>,
    /// Tables with a primary-key column; absent entry means no index
    primary_indexes: HashMap<String, PrimaryIndex>,
    /// Tables with an explicitly enabled composite index
    composite_indexes: HashMap<String, CompositeIndex>,
    versions: VersionStore,
}

impl StorageEngine {
    /// Open the engine rooted at `dir`, creating the directory if needed.
    ///
    /// Startup order: load the catalog, bootstrap per-table max page ids,
    /// rebuild primary indexes by scanning the data pages, then load any
    /// composite indexes (snapshot + WAL replay).
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let catalog = SystemCatalog::load(&dir)?;

        let mut engine = Self {
            dir,
            catalog,
            page_cache: HashMap::new(),
            max_page_ids: HashMap::new(),
            primary_indexes: HashMap::new(),
            composite_indexes: HashMap::new(),
            versions: VersionStore::new(),
        };

        let tables = engine.catalog.table_names();
        for table in &tables {
            let max = probe_max_page_id(&engine.dir, table);
            engine.max_page_ids.insert(table.clone(), max);
            if let Some(schema) = engine.catalog.get_table_schema(table).cloned() {
                engine.init_primary_index(&schema);
            }
        }
        engine.rebuild_primary_indexes(&tables)?;
        for table in &tables {
            if let Some(index) = CompositeIndex::load(&engine.dir, table)? {
                engine.composite_indexes.insert(table.clone(), index);
            }
        }

        Ok(engine)
    }

    /// Data directory this engine is rooted at
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// System catalog access
    pub fn catalog(&self) -> &SystemCatalog {
        &self.catalog
    }

    /// Mutable system catalog access
    pub fn catalog_mut(&mut self) -> &mut SystemCatalog {
        &mut self.catalog
    }

    // ========== Buffer cache ==========

    /// Highest allocated page id for a table, probing the directory for
    /// tables not seen yet.
    pub fn max_page_id(&mut self, table: &str) -> u64 {
        if let Some(&max) = self.max_page_ids.get(table) {
            return max;
        }
        let max = probe_max_page_id(&self.dir, table);
        self.max_page_ids.insert(table.to_string(), max);
        max
    }

    /// Fetch a page: cache hit, else disk load. `None` means the page does
    /// not exist; callers create new pages explicitly.
    pub fn get_page(&mut self, table: &str, page_id: u64) -> Option<&mut Page> {
        let key = (table.to_string(), page_id);
        if !self.page_cache.contains_key(&key) {
            let mut page = Page::new(page_id);
            if page.load_from_disk(&self.dir, table).is_err() {
                return None;
            }
            self.page_cache.insert(key.clone(), page);
        }
        self.page_cache.get_mut(&key)
    }

    /// Allocate the next page for a table and return a view of it.
    pub fn create_new_page(&mut self, table: &str) -> &mut Page {
        let page_id = self.max_page_id(table) + 1;
        self.max_page_ids.insert(table.to_string(), page_id);
        debug!(table, page_id, "new page allocated");
        self.page_cache
            .entry((table.to_string(), page_id))
            .or_insert_with(|| Page::new(page_id))
    }

    /// Write a cached page to disk if it is dirty.
    pub fn write_page(&mut self, table: &str, page_id: u64) -> Result<()> {
        if let Some(page) = self.page_cache.get_mut(&(table.to_string(), page_id)) {
            page.write_to_disk(&self.dir, table)?;
        }
        Ok(())
    }

    /// Flush every dirty cached page. I/O failures are logged and swallowed;
    /// the engine stays usable.
    pub fn flush_all_dirty_pages(&mut self) {
        for ((table, page_id), page) in self.page_cache.iter_mut() {
            if page.is_dirty() {
                if let Err(e) = page.write_to_disk(&self.dir, table) {
                    warn!(table = %table, page_id, error = %e, "flush failed");
                }
            }
        }
    }

    // ========== Primary index ==========

    /// Set up the primary index for a table: enabled iff some column is
    /// marked primary key, keyed on the first such column. Any stale
    /// composite index entry for the name is discarded.
    pub fn init_primary_index(&mut self, schema: &TableSchema) {
        match schema.primary_key_index() {
            Some(pk) => {
                debug!(table = %schema.name, pk_column = pk, "primary index enabled");
                self.primary_indexes
                    .insert(schema.name.clone(), PrimaryIndex::new(pk));
            }
            None => {
                debug!(table = %schema.name, "primary index disabled");
                self.primary_indexes.remove(&schema.name);
            }
        }
        self.composite_indexes.remove(&schema.name);
    }

    /// Upsert a freshly inserted row into the primary index and, when one is
    /// enabled, the composite index (map update first, then a WAL record).
    pub fn insert_index_row(&mut self, table: &str, values: &[String]) -> Result<()> {
        if let Some(index) = self.primary_indexes.get_mut(table) {
            if index.insert(values.to_vec()) {
                debug!(table, size = index.len(), "primary index insert");
            }
        }
        if let Some(index) = self.composite_indexes.get_mut(table) {
            if let Some(key) = index.composite_key(values) {
                index.upsert_logged(key, values.to_vec())?;
            }
        }
        Ok(())
    }

    /// Purge a tombstoned row from both indexes (delete, and update when key
    /// columns change).
    pub fn remove_index_row(&mut self, table: &str, values: &[String]) {
        if let Some(index) = self.primary_indexes.get_mut(table) {
            if let Some(key) = values.get(index.pk_column()) {
                index.remove(key);
            }
        }
        if let Some(index) = self.composite_indexes.get_mut(table) {
            if let Some(key) = index.composite_key(values) {
                index.remove(&key);
            }
        }
    }

    /// Primary-index point lookup
    pub fn index_get_row_values(&self, table: &str, key: &str) -> Option<Vec<String>> {
        self.primary_indexes.get(table)?.get(key).cloned()
    }

    /// Primary-index closed-range lookup
    pub fn index_range_row_values(&self, table: &str, min: &str, max: &str) -> Vec<Vec<String>> {
        match self.primary_indexes.get(table) {
            Some(index) => index.range(min, max),
            None => Vec::new(),
        }
    }

    /// Number of entries in a table's primary index
    pub fn primary_index_size(&self, table: &str) -> usize {
        self.primary_indexes.get(table).map_or(0, |i| i.len())
    }

    /// After the catalog loads, scan every data page and reinsert live rows
    /// so index queries stay consistent across restarts.
    fn rebuild_primary_indexes(&mut self, tables: &[String]) -> Result<()> {
        for table in tables {
            if !self.primary_indexes.contains_key(table) {
                continue;
            }
            let max = self.max_page_id(table);
            for page_id in 1..=max {
                let rows = match self.get_page(table, page_id) {
                    Some(page) => page.rows()?,
                    None => continue,
                };
                if let Some(index) = self.primary_indexes.get_mut(table) {
                    for row in rows {
                        index.insert(row.into_values());
                    }
                }
            }
        }
        Ok(())
    }

    // ========== Composite index ==========

    /// Enable (or redefine) a composite index over the given column
    /// positions: back-fill from the primary index, write a snapshot,
    /// truncate the WAL, persist the meta file.
    pub fn enable_composite_index(&mut self, table: &str, key_columns: Vec<usize>) -> Result<()> {
        let mut index = CompositeIndex::new(&self.dir, table, key_columns);
        if let Some(primary) = self.primary_indexes.get(table) {
            for (_, values) in primary.iter() {
                if let Some(key) = index.composite_key(values) {
                    index.upsert(key, values.clone());
                }
            }
        }
        index.save()?;
        debug!(table, entries = index.len(), "composite index enabled");
        self.composite_indexes.insert(table.to_string(), index);
        Ok(())
    }

    /// Composite-index point lookup
    pub fn composite_index_get_row_values(&self, table: &str, key: &str) -> Option<Vec<String>> {
        self.composite_indexes.get(table)?.get(key).cloned()
    }

    /// Composite-index closed-range lookup
    pub fn composite_index_range_row_values(
        &self,
        table: &str,
        min: &str,
        max: &str,
    ) -> Vec<Vec<String>> {
        match self.composite_indexes.get(table) {
            Some(index) => index.range(min, max),
            None => Vec::new(),
        }
    }

    /// Participating column positions of a table's composite index
    pub fn composite_index_columns(&self, table: &str) -> Option<Vec<usize>> {
        self.composite_indexes
            .get(table)
            .map(|i| i.key_columns().to_vec())
    }

    /// Rewrite the composite snapshot and truncate its WAL. Returns `false`
    /// when the table has no composite index.
    pub fn checkpoint_composite_index(&mut self, table: &str) -> Result<bool> {
        match self.composite_indexes.get(table) {
            Some(index) => {
                index.checkpoint()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop a table's composite index: in-memory entry plus a best-effort
    /// delete of its meta, snapshot, and WAL files.
    pub fn drop_composite_index(&mut self, table: &str) -> bool {
        match self.composite_indexes.remove(table) {
            Some(index) => {
                index.delete_files();
                debug!(table, "composite index dropped");
                true
            }
            None => false,
        }
    }

    // ========== Table teardown ==========

    /// Remove every on-disk and in-memory trace of a table's data: flush and
    /// evict cached pages, delete page files, forget the max id, clear both
    /// indexes. File deletion failures are logged, not fatal.
    pub fn drop_table_data(&mut self, table: &str) {
        let keys: Vec<_> = self
            .page_cache
            .keys()
            .filter(|(t, _)| t == table)
            .cloned()
            .collect();
        for key in keys {
            if let Some(mut page) = self.page_cache.remove(&key) {
                if page.is_dirty() {
                    if let Err(e) = page.write_to_disk(&self.dir, table) {
                        warn!(table, page_id = key.1, error = %e, "flush before drop failed");
                    }
                }
            }
        }

        let max = self.max_page_id(table);
        for page_id in 1..=max {
            let path = self.dir.join(Page::file_name(table, page_id));
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(table, page_id, error = %e, "page file removal failed");
            }
        }

        self.max_page_ids.remove(table);
        self.primary_indexes.remove(table);
        self.drop_composite_index(table);
        debug!(table, "table data dropped");
    }

    // ========== MVCC ==========

    /// Prepend an uncommitted version for `tx`
    pub fn mvcc_insert_uncommitted(
        &mut self,
        table: &str,
        values: Vec<String>,
        tx: TxId,
        pk_index: usize,
    ) -> Result<()> {
        self.versions.insert_uncommitted(table, values, tx, pk_index)
    }

    /// Commit `tx`'s uncommitted insert at the chain head
    pub fn mvcc_commit_insert(&mut self, table: &str, pk: &str, tx: TxId) -> bool {
        self.versions.commit_insert(table, pk, tx)
    }

    /// Unlink `tx`'s uncommitted insert at the chain head
    pub fn mvcc_rollback_insert(&mut self, table: &str, pk: &str, tx: TxId) -> bool {
        self.versions.rollback_insert(table, pk, tx)
    }

    /// Mark the newest committed undeleted version as deleted by `tx`
    pub fn mvcc_mark_delete_commit(&mut self, table: &str, pk: &str, tx: TxId) -> bool {
        self.versions.mark_delete_commit(table, pk, tx)
    }

    /// Visibility lookup against the caller-supplied active-transaction set
    pub fn mvcc_lookup_visible(
        &self,
        table: &str,
        pk: &str,
        reader_tx: TxId,
        active: &[TxId],
    ) -> Option<Vec<String>> {
        self.versions.lookup_visible(table, pk, reader_tx, active)
    }

    /// Reclaim versions deleted before the oldest active transaction
    pub fn mvcc_vacuum(&mut self, oldest_active_tx: TxId) -> usize {
        self.versions.vacuum(oldest_active_tx)
    }

    /// Direct access to the version store (tests, host introspection)
    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }
}

/// Probe `<table>_page_<k>.bin` for k = 1, 2, ... until a gap.
fn probe_max_page_id(dir: &Path, table: &str) -> u64 {
    let mut max = 0;
    while dir.join(Page::file_name(table, max + 1)).exists() {
        max += 1;
    }
    max
}

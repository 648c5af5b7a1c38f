//! System catalog for stratadb
//!
//! Table schemas are persisted as ordinary rows in page 0 of the reserved
//! table `sys_catalog` (file `sys_catalog_page_0.bin`), going through the
//! same page machinery as user data. The in-memory cache is reparsed from
//! that page at startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use super::schema::{Column, TableSchema};
use super::types::DataType;
use crate::error::{Error, Result};
use crate::storage::{Page, Row};

/// Reserved table name holding the catalog page
pub const CATALOG_TABLE: &str = "sys_catalog";

/// System catalog - schema cache plus its persistent page-0 form
#[derive(Debug)]
pub struct SystemCatalog {
    dir: PathBuf,
    /// Table name -> schema, iterated in sorted order on rebuild
    schemas: BTreeMap<String, TableSchema>,
    /// Catalog page (id 0), owned for the lifetime of the catalog
    catalog_page: Page,
}

impl SystemCatalog {
    /// Load the catalog from `dir`, tolerating a missing catalog file.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut catalog_page = Page::new(0);
        let mut schemas = BTreeMap::new();

        if catalog_page.load_from_disk(dir, CATALOG_TABLE).is_ok() {
            for row in catalog_page.rows()? {
                if let Some(schema) = parse_catalog_row(row.values()) {
                    schemas.insert(schema.name.clone(), schema);
                }
            }
        } else {
            catalog_page = Page::new(0);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            schemas,
            catalog_page,
        })
    }

    /// Register a new table and persist the catalog page immediately.
    pub fn register_table(&mut self, schema: TableSchema) -> Result<()> {
        if self.schemas.contains_key(&schema.name) {
            return Err(Error::TableAlreadyExists(schema.name));
        }

        let row = Row::new(encode_catalog_row(&schema));
        if !self.catalog_page.insert_row(&row) {
            return Err(Error::PageFull(0));
        }
        self.catalog_page.write_to_disk(&self.dir, CATALOG_TABLE)?;

        info!(table = %schema.name, columns = schema.column_count(), "table registered");
        self.schemas.insert(schema.name.clone(), schema);
        Ok(())
    }

    /// Remove a table and rebuild the catalog page from the survivors.
    pub fn unregister_table(&mut self, name: &str) -> Result<()> {
        if self.schemas.remove(name).is_none() {
            return Err(Error::TableNotFound(name.to_string()));
        }

        self.catalog_page = Page::new(0);
        self.catalog_page.mark_dirty();
        for schema in self.schemas.values() {
            let row = Row::new(encode_catalog_row(schema));
            if !self.catalog_page.insert_row(&row) {
                return Err(Error::PageFull(0));
            }
        }
        self.catalog_page.write_to_disk(&self.dir, CATALOG_TABLE)?;

        info!(table = %name, "table unregistered");
        Ok(())
    }

    /// Get a table's schema
    pub fn get_table_schema(&self, name: &str) -> Option<&TableSchema> {
        self.schemas.get(name)
    }

    /// Check if a column exists on a table
    pub fn column_exists(&self, table: &str, column: &str) -> bool {
        self.get_table_schema(table)
            .map(|s| s.has_column(column))
            .unwrap_or(false)
    }

    /// Get a column's position within a table's row values
    pub fn get_column_index(&self, table: &str, column: &str) -> Option<usize> {
        self.get_table_schema(table)?.column_index(column)
    }

    /// All registered table names, sorted
    pub fn table_names(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }
}

fn encode_catalog_row(schema: &TableSchema) -> Vec<String> {
    let mut values = Vec::with_capacity(2 + schema.column_count());
    values.push(schema.name.clone());
    values.push(schema.column_count().to_string());
    for col in schema.columns() {
        values.push(format!(
            "{}:{}:{}",
            col.name,
            col.data_type.as_token(),
            if col.primary_key { "1" } else { "0" }
        ));
    }
    values
}

fn parse_catalog_row(values: &[String]) -> Option<TableSchema> {
    if values.len() < 3 {
        return None;
    }
    let name = values[0].clone();
    let count: usize = values[1].parse().ok()?;

    let mut columns = Vec::with_capacity(count);
    for i in 0..count {
        let token = values.get(2 + i)?;
        let mut parts = token.splitn(3, ':');
        let col_name = parts.next()?;
        let type_token = parts.next()?;
        let pk = parts.next()? == "1";
        columns.push(Column::new(col_name, DataType::from_token(type_token)).primary_key(pk));
    }
    Some(TableSchema::new(name, columns))
}

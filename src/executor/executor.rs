//! Operator engine for stratadb
//!
//! Executes typed relational operators against the storage engine: DDL,
//! inserts, scans, filters, projection, delete/update, index scans, joins,
//! order-by, group-by, plus the MVCC primitives and composite-index
//! administration. One caller at a time; every operator runs to completion
//! synchronously.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use tracing::info;

use crate::catalog::{Column, TableSchema};
use crate::error::{Error, Result};
use crate::storage::{Row, StorageEngine};
use crate::transaction::TxId;

/// Comparison operator of a pushed-down filter condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Parse the operator token used by pushed-down conditions
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "=" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }

    fn accepts(&self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        f.write_str(token)
    }
}

/// One pushed-down filter condition; a condition list is AND-joined
#[derive(Debug, Clone)]
pub struct Condition {
    /// Column position within row values
    pub column: usize,
    pub op: CompareOp,
    /// Right-hand side as text
    pub value: String,
}

impl Condition {
    pub fn new(column: usize, op: CompareOp, value: impl Into<String>) -> Self {
        Self {
            column,
            op,
            value: value.into(),
        }
    }

    /// Evaluate against a row; an out-of-range column fails the row.
    fn matches(&self, values: &[String]) -> bool {
        match values.get(self.column) {
            Some(lhs) => self.op.accepts(compare_values(lhs, &self.value)),
            None => false,
        }
    }
}

/// Aggregate functions for GROUP BY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Max => "MAX",
            AggregateFunc::Min => "MIN",
        };
        f.write_str(name)
    }
}

/// One bucket of a GROUP BY result
#[derive(Debug, Clone)]
pub struct GroupByResult {
    /// Values of the grouping columns, in declared order
    pub group_keys: Vec<String>,
    /// Aggregate values keyed `"FN(column)"`; an aggregate with no parsable
    /// input is absent
    pub aggregates: BTreeMap<String, f64>,
}

/// Compare two text values: numeric when both parse as real numbers, else
/// lexicographic on bytes.
fn compare_values(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

fn key_of(row: &Row, index: usize) -> &str {
    row.values().get(index).map(String::as_str).unwrap_or("")
}

/// Execution engine: the host-facing operator surface
#[derive(Debug)]
pub struct ExecutionEngine {
    storage: StorageEngine,
}

impl ExecutionEngine {
    /// Open an engine rooted at the given data directory
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            storage: StorageEngine::open(dir)?,
        })
    }

    /// Underlying storage engine
    pub fn storage(&self) -> &StorageEngine {
        &self.storage
    }

    /// Mutable access to the underlying storage engine
    pub fn storage_mut(&mut self) -> &mut StorageEngine {
        &mut self.storage
    }

    /// Flush every dirty cached page (host shutdown hook)
    pub fn flush(&mut self) {
        self.storage.flush_all_dirty_pages();
    }

    // ========== DDL ==========

    /// Create a table: register its schema and initialize the primary index.
    pub fn create_table(&mut self, name: &str, columns: Vec<Column>) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("table name is empty".to_string()));
        }
        if columns.is_empty() {
            return Err(Error::InvalidArgument("column list is empty".to_string()));
        }

        let schema = TableSchema::new(name, columns);
        self.storage.catalog_mut().register_table(schema.clone())?;
        self.storage.init_primary_index(&schema);
        Ok(())
    }

    /// Drop a table: unregister it, then remove its pages, indexes, and
    /// cached state.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("table name is empty".to_string()));
        }
        if self.storage.catalog().get_table_schema(name).is_none() {
            return Err(Error::TableNotFound(name.to_string()));
        }

        self.storage.catalog_mut().unregister_table(name)?;
        self.storage.drop_table_data(name);
        info!(table = %name, "table dropped");
        Ok(())
    }

    // ========== Insert ==========

    /// Insert one row. The touched page is persisted immediately and the
    /// indexes are maintained synchronously.
    pub fn insert(&mut self, table: &str, values: Vec<String>) -> Result<()> {
        let column_count = self
            .storage
            .catalog()
            .get_table_schema(table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?
            .column_count();
        if values.len() != column_count {
            return Err(Error::InvalidArgument(format!(
                "table '{}' has {} columns, got {} values",
                table,
                column_count,
                values.len()
            )));
        }
        self.insert_values(table, values)
    }

    /// Insert pre-validated values: try cached pages newest-first, fall back
    /// to a fresh page, and keep the indexes in step.
    fn insert_values(&mut self, table: &str, values: Vec<String>) -> Result<()> {
        let row = Row::new(values);

        let max = self.storage.max_page_id(table);
        for page_id in (1..=max).rev() {
            let inserted = match self.storage.get_page(table, page_id) {
                Some(page) => page.insert_row(&row),
                None => false,
            };
            if inserted {
                self.storage.write_page(table, page_id)?;
                self.storage.insert_index_row(table, row.values())?;
                return Ok(());
            }
        }

        let page = self.storage.create_new_page(table);
        let page_id = page.id();
        if !page.insert_row(&row) {
            return Err(Error::RowTooLarge(row.serialize().len()));
        }
        self.storage.write_page(table, page_id)?;
        self.storage.insert_index_row(table, row.values())?;
        Ok(())
    }

    /// Bulk insert; attempts follow input order and failures do not abort
    /// the batch. Returns the number of rows inserted.
    pub fn insert_many(&mut self, table: &str, rows: Vec<Vec<String>>) -> usize {
        let mut inserted = 0;
        for values in rows {
            if self.insert(table, values).is_ok() {
                inserted += 1;
            }
        }
        inserted
    }

    // ========== Scans and filters ==========

    /// Full scan: live rows of every page in page order.
    pub fn seq_scan(&mut self, table: &str) -> Result<Vec<Row>> {
        self.storage
            .catalog()
            .get_table_schema(table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?;

        let max = self.storage.max_page_id(table);
        let mut all = Vec::new();
        for page_id in 1..=max {
            if let Some(page) = self.storage.get_page(table, page_id) {
                all.extend(page.rows()?);
            }
        }
        Ok(all)
    }

    /// Scan and retain rows satisfying a host-supplied predicate.
    pub fn filter<P>(&mut self, table: &str, predicate: P) -> Result<Vec<Row>>
    where
        P: Fn(&[String]) -> bool,
    {
        Ok(self
            .seq_scan(table)?
            .into_iter()
            .filter(|row| predicate(row.values()))
            .collect())
    }

    /// Scan with pushed-down conditions, AND-joined.
    pub fn filter_conditions(&mut self, table: &str, conditions: &[Condition]) -> Result<Vec<Row>> {
        let rows = self.seq_scan(table)?;
        if conditions.is_empty() {
            return Ok(rows);
        }
        Ok(rows
            .into_iter()
            .filter(|row| conditions.iter().all(|c| c.matches(row.values())))
            .collect())
    }

    /// Project rows onto the named columns, in the requested order.
    pub fn project(
        &self,
        table: &str,
        rows: &[Row],
        columns: &[&str],
    ) -> Result<Vec<Vec<String>>> {
        let mut indices = Vec::with_capacity(columns.len());
        for name in columns {
            let index = self
                .storage
                .catalog()
                .get_column_index(table, name)
                .ok_or_else(|| Error::ColumnNotFound(name.to_string(), table.to_string()))?;
            indices.push(index);
        }

        Ok(rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|&i| row.values().get(i).cloned().unwrap_or_default())
                    .collect()
            })
            .collect())
    }

    // ========== Delete and update ==========

    /// Tombstone every live row satisfying the predicate, flush touched
    /// pages, and purge the rows from both indexes. Returns the count.
    pub fn delete_rows<P>(&mut self, table: &str, predicate: P) -> Result<usize>
    where
        P: Fn(&[String]) -> bool,
    {
        self.storage
            .catalog()
            .get_table_schema(table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?;

        let max = self.storage.max_page_id(table);
        let mut purged = Vec::new();
        for page_id in 1..=max {
            let mut touched = false;
            if let Some(page) = self.storage.get_page(table, page_id) {
                for (offset, row) in page.records()? {
                    if !row.is_deleted() && predicate(row.values()) {
                        page.tombstone_at(offset);
                        purged.push(row.into_values());
                        touched = true;
                    }
                }
            }
            if touched {
                self.storage.write_page(table, page_id)?;
            }
        }

        for values in &purged {
            self.storage.remove_index_row(table, values);
        }
        Ok(purged.len())
    }

    /// Update every live row satisfying the predicate: tombstone the old
    /// copy, reinsert the updated row through the regular insert path (a new
    /// page if nothing else fits), and fix up index entries whose keys
    /// changed. Returns the count.
    pub fn update_rows<P>(
        &mut self,
        table: &str,
        set_clauses: &[(&str, &str)],
        predicate: P,
    ) -> Result<usize>
    where
        P: Fn(&[String]) -> bool,
    {
        let schema = self
            .storage
            .catalog()
            .get_table_schema(table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?;

        // Unknown SET columns are ignored; with none left the update is a
        // no-op.
        let assignments: Vec<(usize, String)> = set_clauses
            .iter()
            .filter_map(|(name, value)| {
                schema.column_index(name).map(|i| (i, value.to_string()))
            })
            .collect();
        if assignments.is_empty() {
            return Ok(0);
        }

        let max = self.storage.max_page_id(table);
        let mut replaced: Vec<(Vec<String>, Vec<String>)> = Vec::new();
        for page_id in 1..=max {
            let mut touched = false;
            if let Some(page) = self.storage.get_page(table, page_id) {
                for (offset, row) in page.records()? {
                    if !row.is_deleted() && predicate(row.values()) {
                        let mut new_values = row.values().to_vec();
                        for (index, value) in &assignments {
                            new_values[*index] = value.clone();
                        }
                        page.tombstone_at(offset);
                        replaced.push((row.into_values(), new_values));
                        touched = true;
                    }
                }
            }
            if touched {
                self.storage.write_page(table, page_id)?;
            }
        }

        let updated = replaced.len();
        for (old_values, new_values) in replaced {
            self.storage.remove_index_row(table, &old_values);
            self.insert_values(table, new_values)?;
        }
        Ok(updated)
    }

    // ========== Index scans ==========

    /// Primary-index point lookup
    pub fn index_scan(&self, table: &str, pk: &str) -> Option<Row> {
        self.storage.index_get_row_values(table, pk).map(Row::new)
    }

    /// Primary-index closed-range lookup, ascending key order
    pub fn index_range_scan(&self, table: &str, min_pk: &str, max_pk: &str) -> Vec<Row> {
        self.storage
            .index_range_row_values(table, min_pk, max_pk)
            .into_iter()
            .map(Row::new)
            .collect()
    }

    /// Composite-index point lookup
    pub fn composite_index_scan(&self, table: &str, key: &str) -> Option<Row> {
        self.storage
            .composite_index_get_row_values(table, key)
            .map(Row::new)
    }

    /// Composite-index closed-range lookup, ascending key order
    pub fn composite_index_range_scan(&self, table: &str, min_key: &str, max_key: &str) -> Vec<Row> {
        self.storage
            .composite_index_range_row_values(table, min_key, max_key)
            .into_iter()
            .map(Row::new)
            .collect()
    }

    // ========== Joins ==========

    /// Hash inner join: build a multimap over the right side, probe in left
    /// scan order, emit `left ++ right` fields per match.
    pub fn inner_join(
        &mut self,
        left: &str,
        right: &str,
        left_col: &str,
        right_col: &str,
    ) -> Result<Vec<Vec<String>>> {
        let left_idx = self
            .storage
            .catalog()
            .get_column_index(left, left_col)
            .ok_or_else(|| Error::ColumnNotFound(left_col.to_string(), left.to_string()))?;
        let right_idx = self
            .storage
            .catalog()
            .get_column_index(right, right_col)
            .ok_or_else(|| Error::ColumnNotFound(right_col.to_string(), right.to_string()))?;

        let right_rows = self.seq_scan(right)?;
        let mut build: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, row) in right_rows.iter().enumerate() {
            if let Some(key) = row.values().get(right_idx) {
                build.entry(key).or_default().push(i);
            }
        }

        let left_rows = self.seq_scan(left)?;
        let mut out = Vec::new();
        for left_row in &left_rows {
            let Some(key) = left_row.values().get(left_idx) else {
                continue;
            };
            if let Some(matches) = build.get(key.as_str()) {
                for &i in matches {
                    let mut joined = left_row.values().to_vec();
                    joined.extend_from_slice(right_rows[i].values());
                    out.push(joined);
                }
            }
        }
        Ok(out)
    }

    /// Sort-merge inner join: both sides ordered by the join key under the
    /// numeric-or-lexicographic rule, equal-key runs cross-multiplied.
    pub fn merge_join(
        &mut self,
        left: &str,
        right: &str,
        left_col: &str,
        right_col: &str,
    ) -> Result<Vec<Vec<String>>> {
        let left_idx = self
            .storage
            .catalog()
            .get_column_index(left, left_col)
            .ok_or_else(|| Error::ColumnNotFound(left_col.to_string(), left.to_string()))?;
        let right_idx = self
            .storage
            .catalog()
            .get_column_index(right, right_col)
            .ok_or_else(|| Error::ColumnNotFound(right_col.to_string(), right.to_string()))?;

        let mut left_rows = self.seq_scan(left)?;
        let mut right_rows = self.seq_scan(right)?;
        left_rows.sort_by(|a, b| compare_values(key_of(a, left_idx), key_of(b, left_idx)));
        right_rows.sort_by(|a, b| compare_values(key_of(a, right_idx), key_of(b, right_idx)));

        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < left_rows.len() && j < right_rows.len() {
            let lk = key_of(&left_rows[i], left_idx);
            let rk = key_of(&right_rows[j], right_idx);
            match compare_values(lk, rk) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    let mut i_end = i;
                    while i_end < left_rows.len()
                        && compare_values(key_of(&left_rows[i_end], left_idx), lk)
                            == Ordering::Equal
                    {
                        i_end += 1;
                    }
                    let mut j_end = j;
                    while j_end < right_rows.len()
                        && compare_values(key_of(&right_rows[j_end], right_idx), rk)
                            == Ordering::Equal
                    {
                        j_end += 1;
                    }
                    for a in i..i_end {
                        for b in j..j_end {
                            let mut joined = left_rows[a].values().to_vec();
                            joined.extend_from_slice(right_rows[b].values());
                            out.push(joined);
                        }
                    }
                    i = i_end;
                    j = j_end;
                }
            }
        }
        Ok(out)
    }

    // ========== Order by and group by ==========

    /// Stable multi-key sort of the full scan; unknown columns are ignored.
    pub fn order_by(&mut self, table: &str, clauses: &[(&str, bool)]) -> Result<Vec<Row>> {
        let keys: Vec<(usize, bool)> = clauses
            .iter()
            .filter_map(|(name, ascending)| {
                self.storage
                    .catalog()
                    .get_column_index(table, name)
                    .map(|i| (i, *ascending))
            })
            .collect();

        let mut rows = self.seq_scan(table)?;
        if keys.is_empty() {
            return Ok(rows);
        }

        rows.sort_by(|a, b| {
            for &(index, ascending) in &keys {
                let (va, vb) = match (a.values().get(index), b.values().get(index)) {
                    (Some(x), Some(y)) => (x, y),
                    _ => continue,
                };
                let ord = compare_values(va, vb);
                let ord = if ascending { ord } else { ord.reverse() };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        Ok(rows)
    }

    /// Bucket rows by the group columns and compute the requested
    /// aggregates per bucket. Non-numeric values are silently skipped by
    /// SUM/AVG/MAX/MIN; COUNT is the bucket size regardless of column.
    pub fn group_by(
        &mut self,
        table: &str,
        group_columns: &[&str],
        aggregates: &[(&str, AggregateFunc)],
    ) -> Result<Vec<GroupByResult>> {
        let group_indices: Vec<usize> = group_columns
            .iter()
            .filter_map(|name| self.storage.catalog().get_column_index(table, name))
            .collect();
        let agg_exprs: Vec<(usize, AggregateFunc, String)> = aggregates
            .iter()
            .filter_map(|(name, func)| {
                self.storage
                    .catalog()
                    .get_column_index(table, name)
                    .map(|i| (i, *func, format!("{}({})", func, name)))
            })
            .collect();

        let rows = self.seq_scan(table)?;

        // Bucket identity is the group tuple joined with '|'.
        let mut buckets: BTreeMap<String, (Vec<String>, Vec<Row>)> = BTreeMap::new();
        for row in rows {
            let parts: Vec<String> = group_indices
                .iter()
                .map(|&i| row.values().get(i).cloned().unwrap_or_default())
                .collect();
            let key = parts.join("|");
            buckets
                .entry(key)
                .or_insert_with(|| (parts.clone(), Vec::new()))
                .1
                .push(row);
        }

        let mut results = Vec::with_capacity(buckets.len());
        for (_, (group_keys, bucket)) in buckets {
            let mut aggregates = BTreeMap::new();
            for (index, func, label) in &agg_exprs {
                if *func == AggregateFunc::Count {
                    aggregates.insert(label.clone(), bucket.len() as f64);
                    continue;
                }
                let numbers: Vec<f64> = bucket
                    .iter()
                    .filter_map(|row| row.values().get(*index))
                    .filter_map(|v| v.parse().ok())
                    .collect();
                if numbers.is_empty() {
                    continue;
                }
                let value = match func {
                    AggregateFunc::Sum => numbers.iter().sum(),
                    AggregateFunc::Avg => numbers.iter().sum::<f64>() / numbers.len() as f64,
                    AggregateFunc::Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    AggregateFunc::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
                    AggregateFunc::Count => unreachable!(),
                };
                aggregates.insert(label.clone(), value);
            }
            results.push(GroupByResult {
                group_keys,
                aggregates,
            });
        }
        Ok(results)
    }

    // ========== Composite-index administration ==========

    /// Enable (or redefine) a composite index over the given column
    /// positions, back-filled from the primary index.
    pub fn enable_composite_index(&mut self, table: &str, key_columns: &[usize]) -> Result<()> {
        if self.storage.catalog().get_table_schema(table).is_none() {
            return Err(Error::TableNotFound(table.to_string()));
        }
        if key_columns.is_empty() {
            return Err(Error::InvalidArgument(
                "composite index needs at least one column".to_string(),
            ));
        }
        self.storage
            .enable_composite_index(table, key_columns.to_vec())
    }

    /// Drop a table's composite index; `false` when none was enabled.
    pub fn drop_composite_index(&mut self, table: &str) -> bool {
        self.storage.drop_composite_index(table)
    }

    /// Participating column positions of a table's composite index
    pub fn describe_composite_index(&self, table: &str) -> Option<Vec<usize>> {
        self.storage.composite_index_columns(table)
    }

    /// Rewrite the composite snapshot and truncate its WAL; `false` when the
    /// table has no composite index.
    pub fn checkpoint_composite_index(&mut self, table: &str) -> Result<bool> {
        self.storage.checkpoint_composite_index(table)
    }

    // ========== MVCC primitives ==========

    /// Prepend an uncommitted version for `tx`
    pub fn mvcc_insert_uncommitted(
        &mut self,
        table: &str,
        values: Vec<String>,
        tx: TxId,
        pk_index: usize,
    ) -> Result<()> {
        self.storage.mvcc_insert_uncommitted(table, values, tx, pk_index)
    }

    /// Commit `tx`'s uncommitted insert at the chain head
    pub fn mvcc_commit_insert(&mut self, table: &str, pk: &str, tx: TxId) -> bool {
        self.storage.mvcc_commit_insert(table, pk, tx)
    }

    /// Unlink `tx`'s uncommitted insert at the chain head
    pub fn mvcc_rollback_insert(&mut self, table: &str, pk: &str, tx: TxId) -> bool {
        self.storage.mvcc_rollback_insert(table, pk, tx)
    }

    /// Mark the newest committed undeleted version as deleted by `tx`
    pub fn mvcc_mark_delete_commit(&mut self, table: &str, pk: &str, tx: TxId) -> bool {
        self.storage.mvcc_mark_delete_commit(table, pk, tx)
    }

    /// Visibility lookup against the caller's active-transaction set
    pub fn mvcc_lookup_visible(
        &self,
        table: &str,
        pk: &str,
        reader_tx: TxId,
        active: &[TxId],
    ) -> Option<Vec<String>> {
        self.storage.mvcc_lookup_visible(table, pk, reader_tx, active)
    }

    /// Reclaim versions deleted before the oldest active transaction
    pub fn mvcc_vacuum(&mut self, oldest_active_tx: TxId) -> usize {
        self.storage.mvcc_vacuum(oldest_active_tx)
    }
}

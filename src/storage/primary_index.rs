//! Primary index for stratadb
//!
//! An ordered in-memory map from primary-key text to the materialized row.
//! There is no on-disk form of its own: the index is rebuilt from the data
//! pages when the engine starts.

use std::collections::BTreeMap;
use std::ops::Bound;

/// In-memory primary index of one table
#[derive(Debug)]
pub struct PrimaryIndex {
    /// Position of the primary-key column within row values
    pk_column: usize,
    /// pk text -> full row values
    entries: BTreeMap<String, Vec<String>>,
}

impl PrimaryIndex {
    /// Create an empty index keyed on the given column position
    pub fn new(pk_column: usize) -> Self {
        Self {
            pk_column,
            entries: BTreeMap::new(),
        }
    }

    /// Position of the primary-key column
    pub fn pk_column(&self) -> usize {
        self.pk_column
    }

    /// Upsert a row, last-writer-wins on duplicate keys.
    ///
    /// Rows too short to carry the key column are ignored.
    pub fn insert(&mut self, values: Vec<String>) -> bool {
        match values.get(self.pk_column) {
            Some(key) => {
                self.entries.insert(key.clone(), values);
                true
            }
            None => false,
        }
    }

    /// Exact-match lookup
    pub fn get(&self, key: &str) -> Option<&Vec<String>> {
        self.entries.get(key)
    }

    /// Closed-interval range lookup in ascending key order
    pub fn range(&self, min: &str, max: &str) -> Vec<Vec<String>> {
        if min > max {
            return Vec::new();
        }
        let bounds = (Bound::Included(min), Bound::Included(max));
        self.entries
            .range::<str, _>(bounds)
            .map(|(_, values)| values.clone())
            .collect()
    }

    /// Remove an entry, returning the row it held
    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.entries.remove(key)
    }

    /// Number of indexed rows
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the index holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in ascending key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_insert_and_get() {
        let mut index = PrimaryIndex::new(0);
        assert!(index.insert(row(&["1", "A"])));
        assert!(index.insert(row(&["2", "B"])));

        assert_eq!(index.get("1").unwrap()[1], "A");
        assert!(index.get("3").is_none());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_last_writer_wins() {
        let mut index = PrimaryIndex::new(0);
        index.insert(row(&["1", "old"]));
        index.insert(row(&["1", "new"]));

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("1").unwrap()[1], "new");
    }

    #[test]
    fn test_short_row_ignored() {
        let mut index = PrimaryIndex::new(2);
        assert!(!index.insert(row(&["only", "two"])));
        assert!(index.is_empty());
    }

    #[test]
    fn test_range_is_closed_and_ordered() {
        let mut index = PrimaryIndex::new(0);
        for key in ["3", "1", "4", "2"] {
            index.insert(row(&[key, "x"]));
        }

        let hits = index.range("1", "3");
        let keys: Vec<&str> = hits.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(keys, ["1", "2", "3"]);

        assert!(index.range("9", "1").is_empty());
    }

    #[test]
    fn test_remove() {
        let mut index = PrimaryIndex::new(0);
        index.insert(row(&["1", "A"]));
        assert_eq!(index.remove("1").unwrap()[1], "A");
        assert!(index.remove("1").is_none());
        assert!(index.is_empty());
    }
}

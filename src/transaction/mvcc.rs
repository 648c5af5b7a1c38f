//! MVCC version chains
//!
//! Per (table, primary key) singly-linked chains of row versions, newest
//! first. Each version carries the transaction that created it (`xmin`), the
//! transaction that logically deleted it (`xmax`), and a committed bit.
//! Transaction state itself (ids, the active set) is owned entirely by the
//! caller; visibility is decided per read against the supplied active set,
//! read-committed style.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Transaction identifier
pub type TxId = u64;

/// One version of a row
#[derive(Debug)]
struct VersionNode {
    values: Vec<String>,
    xmin: TxId,
    xmax: Option<TxId>,
    committed: bool,
    next: Option<Box<VersionNode>>,
}

/// Version chains for all tables, keyed by (table, pk)
#[derive(Debug, Default)]
pub struct VersionStore {
    chains: HashMap<(String, String), Box<VersionNode>>,
}

impl VersionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend an uncommitted version created by `tx`.
    ///
    /// Fails with `InvalidArgument` when the row cannot carry the key column.
    pub fn insert_uncommitted(
        &mut self,
        table: &str,
        values: Vec<String>,
        tx: TxId,
        pk_index: usize,
    ) -> Result<()> {
        let pk = values.get(pk_index).cloned().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "pk index {} out of range for row of {} values",
                pk_index,
                values.len()
            ))
        })?;

        let key = (table.to_string(), pk);
        let next = self.chains.remove(&key);
        self.chains.insert(
            key,
            Box::new(VersionNode {
                values,
                xmin: tx,
                xmax: None,
                committed: false,
                next,
            }),
        );
        Ok(())
    }

    /// Commit the chain head, which must be `tx`'s own uncommitted insert.
    pub fn commit_insert(&mut self, table: &str, pk: &str, tx: TxId) -> bool {
        match self.chains.get_mut(&(table.to_string(), pk.to_string())) {
            Some(head) if !head.committed && head.xmin == tx => {
                head.committed = true;
                true
            }
            _ => false,
        }
    }

    /// Unlink and free the chain head, which must be `tx`'s own uncommitted
    /// insert.
    pub fn rollback_insert(&mut self, table: &str, pk: &str, tx: TxId) -> bool {
        let key = (table.to_string(), pk.to_string());
        if let Some(head) = self.chains.remove(&key) {
            if !head.committed && head.xmin == tx {
                if let Some(next) = head.next {
                    self.chains.insert(key, next);
                }
                return true;
            }
            self.chains.insert(key, head);
        }
        false
    }

    /// Mark the newest committed, undeleted version as deleted by `tx`.
    pub fn mark_delete_commit(&mut self, table: &str, pk: &str, tx: TxId) -> bool {
        let mut node = match self.chains.get_mut(&(table.to_string(), pk.to_string())) {
            Some(head) => head.as_mut(),
            None => return false,
        };
        loop {
            if node.committed && node.xmax.is_none() {
                node.xmax = Some(tx);
                return true;
            }
            match node.next.as_mut() {
                Some(next) => node = next,
                None => return false,
            }
        }
    }

    /// Find the version visible to `reader_tx` given the caller's snapshot of
    /// active (not yet committed or aborted) transactions: the reader's own
    /// uncommitted insert, or the newest committed undeleted version whose
    /// inserter is not active.
    pub fn lookup_visible(
        &self,
        table: &str,
        pk: &str,
        reader_tx: TxId,
        active: &[TxId],
    ) -> Option<Vec<String>> {
        let mut cur = self
            .chains
            .get(&(table.to_string(), pk.to_string()))
            .map(|b| b.as_ref());
        while let Some(node) = cur {
            if !node.committed {
                if node.xmin == reader_tx {
                    return Some(node.values.clone());
                }
            } else if node.xmax.is_none() && !active.contains(&node.xmin) {
                return Some(node.values.clone());
            }
            cur = node.next.as_deref();
        }
        None
    }

    /// Number of versions currently chained for (table, pk)
    pub fn version_count(&self, table: &str, pk: &str) -> usize {
        let mut cur = self
            .chains
            .get(&(table.to_string(), pk.to_string()))
            .map(|b| b.as_ref());
        let mut count = 0;
        while let Some(node) = cur {
            count += 1;
            cur = node.next.as_deref();
        }
        count
    }

    /// Reclaim versions no transaction can still see: committed nodes whose
    /// `xmax` is older than the oldest active transaction. Emptied chains are
    /// dropped. Returns the number of versions removed.
    pub fn vacuum(&mut self, oldest_active_tx: TxId) -> usize {
        let mut removed = 0;
        let keys: Vec<_> = self.chains.keys().cloned().collect();

        for key in keys {
            let Some(head) = self.chains.remove(&key) else {
                continue;
            };

            // Unlink into a list, partition, relink survivors in order.
            let mut nodes = Vec::new();
            let mut cur = Some(head);
            while let Some(mut node) = cur {
                cur = node.next.take();
                nodes.push(node);
            }

            let mut rebuilt: Option<Box<VersionNode>> = None;
            for mut node in nodes.into_iter().rev() {
                let dead = node.committed
                    && matches!(node.xmax, Some(xmax) if xmax < oldest_active_tx);
                if dead {
                    removed += 1;
                } else {
                    node.next = rebuilt.take();
                    rebuilt = Some(node);
                }
            }

            if let Some(head) = rebuilt {
                self.chains.insert(key, head);
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_uncommitted_visible_only_to_inserter() {
        let mut store = VersionStore::new();
        store.insert_uncommitted("t", row(&["1", "A"]), 10, 0).unwrap();

        assert!(store.lookup_visible("t", "1", 10, &[10]).is_some());
        assert!(store.lookup_visible("t", "1", 20, &[10]).is_none());
    }

    #[test]
    fn test_commit_makes_row_visible() {
        let mut store = VersionStore::new();
        store.insert_uncommitted("t", row(&["1", "A"]), 10, 0).unwrap();

        assert!(store.commit_insert("t", "1", 10));
        let seen = store.lookup_visible("t", "1", 20, &[]).unwrap();
        assert_eq!(seen, row(&["1", "A"]));
    }

    #[test]
    fn test_commit_requires_matching_uncommitted_head() {
        let mut store = VersionStore::new();
        store.insert_uncommitted("t", row(&["1", "A"]), 10, 0).unwrap();

        assert!(!store.commit_insert("t", "1", 99));
        assert!(store.commit_insert("t", "1", 10));
        // Already committed: a second commit is refused.
        assert!(!store.commit_insert("t", "1", 10));
    }

    #[test]
    fn test_rollback_unlinks_head() {
        let mut store = VersionStore::new();
        store.insert_uncommitted("t", row(&["1", "old"]), 10, 0).unwrap();
        store.commit_insert("t", "1", 10);
        store.insert_uncommitted("t", row(&["1", "new"]), 20, 0).unwrap();

        assert!(store.rollback_insert("t", "1", 20));
        // The committed version is intact.
        let seen = store.lookup_visible("t", "1", 30, &[]).unwrap();
        assert_eq!(seen[1], "old");
    }

    #[test]
    fn test_rollback_refuses_committed_head() {
        let mut store = VersionStore::new();
        store.insert_uncommitted("t", row(&["1", "A"]), 10, 0).unwrap();
        store.commit_insert("t", "1", 10);
        assert!(!store.rollback_insert("t", "1", 10));
        assert_eq!(store.version_count("t", "1"), 1);
    }

    #[test]
    fn test_mark_delete_hides_row() {
        let mut store = VersionStore::new();
        store.insert_uncommitted("t", row(&["1", "A"]), 10, 0).unwrap();
        store.commit_insert("t", "1", 10);

        assert!(store.mark_delete_commit("t", "1", 20));
        assert!(store.lookup_visible("t", "1", 30, &[]).is_none());
        // A second delete finds no undeleted committed version.
        assert!(!store.mark_delete_commit("t", "1", 21));
    }

    #[test]
    fn test_active_inserter_hides_committed_row() {
        let mut store = VersionStore::new();
        store.insert_uncommitted("t", row(&["1", "A"]), 10, 0).unwrap();
        store.commit_insert("t", "1", 10);

        // Reader still considers tx 10 active: the row is invisible.
        assert!(store.lookup_visible("t", "1", 20, &[10]).is_none());
        assert!(store.lookup_visible("t", "1", 20, &[]).is_some());
    }

    #[test]
    fn test_pk_index_out_of_range() {
        let mut store = VersionStore::new();
        let result = store.insert_uncommitted("t", row(&["1"]), 10, 5);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_vacuum_reclaims_deleted_versions() {
        let mut store = VersionStore::new();
        store.insert_uncommitted("t", row(&["1", "v1"]), 10, 0).unwrap();
        store.commit_insert("t", "1", 10);
        store.mark_delete_commit("t", "1", 11);
        store.insert_uncommitted("t", row(&["1", "v2"]), 12, 0).unwrap();
        store.commit_insert("t", "1", 12);
        assert_eq!(store.version_count("t", "1"), 2);

        // Oldest active tx still overlaps the deleter: nothing to reclaim.
        assert_eq!(store.vacuum(11), 0);

        assert_eq!(store.vacuum(20), 1);
        assert_eq!(store.version_count("t", "1"), 1);
        let seen = store.lookup_visible("t", "1", 30, &[]).unwrap();
        assert_eq!(seen[1], "v2");
    }

    #[test]
    fn test_vacuum_drops_empty_chains() {
        let mut store = VersionStore::new();
        store.insert_uncommitted("t", row(&["1", "A"]), 10, 0).unwrap();
        store.commit_insert("t", "1", 10);
        store.mark_delete_commit("t", "1", 11);

        assert_eq!(store.vacuum(20), 1);
        assert_eq!(store.version_count("t", "1"), 0);
    }
}

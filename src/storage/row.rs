//! Row codec for stratadb
//!
//! A row is an ordered sequence of text field values plus a tombstone flag.
//! The wire layout is `[u8 tombstone][u64 n][n x (u64 len, len bytes)]` with
//! every length prefix 8 bytes little-endian, independent of the host word
//! size so page files stay portable across 32/64-bit hosts.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Width of every on-disk length prefix (u64 little-endian).
pub const LEN_WIDTH: usize = std::mem::size_of::<u64>();

/// A row of text field values with a logical-delete flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    values: Vec<String>,
    deleted: bool,
}

impl Row {
    /// Create a live row from field values
    pub fn new(values: Vec<String>) -> Self {
        Self {
            values,
            deleted: false,
        }
    }

    /// Get all field values
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Consume the row and return the field values
    pub fn into_values(self) -> Vec<String> {
        self.values
    }

    /// Check the tombstone flag
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Set the tombstone flag
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    /// Serialize to the on-disk byte layout
    pub fn serialize(&self) -> Vec<u8> {
        let payload: usize = self.values.iter().map(|v| LEN_WIDTH + v.len()).sum();
        let mut bytes = Vec::with_capacity(1 + LEN_WIDTH + payload);

        bytes.push(self.deleted as u8);
        bytes.extend_from_slice(&(self.values.len() as u64).to_le_bytes());
        for value in &self.values {
            bytes.extend_from_slice(&(value.len() as u64).to_le_bytes());
            bytes.extend_from_slice(value.as_bytes());
        }
        bytes
    }

    /// Deserialize from the on-disk byte layout.
    ///
    /// Never reads past the supplied buffer; trailing bytes beyond the encoded
    /// row are tolerated (page records carry zero padding at the tail).
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let deleted = match bytes.first() {
            Some(&b) => b == 1,
            None => return Err(Error::MalformedRow("empty buffer".to_string())),
        };
        let mut pos = 1;

        let count = read_len(bytes, &mut pos)? as usize;
        let mut values = Vec::new();
        for i in 0..count {
            let len = read_len(bytes, &mut pos)? as usize;
            let end = pos.checked_add(len).filter(|&e| e <= bytes.len()).ok_or_else(|| {
                Error::MalformedRow(format!("field {} of {} exceeds buffer", i, count))
            })?;
            let value = String::from_utf8(bytes[pos..end].to_vec())
                .map_err(|e| Error::MalformedRow(e.to_string()))?;
            values.push(value);
            pos = end;
        }

        Ok(Self { values, deleted })
    }
}

fn read_len(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let end = pos
        .checked_add(LEN_WIDTH)
        .filter(|&e| e <= bytes.len())
        .ok_or_else(|| Error::MalformedRow("truncated length prefix".to_string()))?;
    let mut buf = [0u8; LEN_WIDTH];
    buf.copy_from_slice(&bytes[*pos..end]);
    *pos = end;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let row = Row::new(vec!["1".to_string(), "Alice".to_string(), "20.5".to_string()]);
        let bytes = row.serialize();
        assert_eq!(Row::deserialize(&bytes).unwrap(), row);
    }

    #[test]
    fn test_round_trip_preserves_tombstone() {
        let mut row = Row::new(vec!["x".to_string()]);
        row.mark_deleted();
        let decoded = Row::deserialize(&row.serialize()).unwrap();
        assert!(decoded.is_deleted());
        assert_eq!(decoded.values(), row.values());
    }

    #[test]
    fn test_empty_row_and_empty_fields() {
        let row = Row::new(vec![]);
        assert_eq!(Row::deserialize(&row.serialize()).unwrap(), row);

        let row = Row::new(vec![String::new(), "b".to_string(), String::new()]);
        assert_eq!(Row::deserialize(&row.serialize()).unwrap(), row);
    }

    #[test]
    fn test_trailing_bytes_tolerated() {
        let row = Row::new(vec!["a".to_string(), "bc".to_string()]);
        let mut bytes = row.serialize();
        bytes.extend_from_slice(&[0u8; 16]);
        assert_eq!(Row::deserialize(&bytes).unwrap(), row);
    }

    #[test]
    fn test_truncated_buffer_fails() {
        let row = Row::new(vec!["hello".to_string()]);
        let bytes = row.serialize();
        assert!(Row::deserialize(&bytes[..bytes.len() - 1]).is_err());
        assert!(Row::deserialize(&bytes[..4]).is_err());
        assert!(Row::deserialize(&[]).is_err());
    }

    #[test]
    fn test_lying_field_count_fails() {
        let row = Row::new(vec!["a".to_string()]);
        let mut bytes = row.serialize();
        // Claim four fields while only one follows.
        bytes[1..1 + LEN_WIDTH].copy_from_slice(&4u64.to_le_bytes());
        assert!(Row::deserialize(&bytes).is_err());
    }
}

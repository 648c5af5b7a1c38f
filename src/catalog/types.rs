//! Data types for stratadb
//!
//! This module defines the column data types supported by the engine.
//! Values are stored as UTF-8 text regardless of the declared type;
//! type coercion is a query-time concern.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Integer
    Int,
    /// Character string
    String,
    /// Double-precision floating point
    Double,
}

impl DataType {
    /// Parse a catalog token ("INT", "STRING", "DOUBLE").
    /// Unknown tokens fall back to INT, matching the lenient catalog reader.
    pub fn from_token(token: &str) -> Self {
        match token {
            "STRING" => DataType::String,
            "DOUBLE" => DataType::Double,
            _ => DataType::Int,
        }
    }

    /// The token written into catalog rows.
    pub fn as_token(&self) -> &'static str {
        match self {
            DataType::Int => "INT",
            DataType::String => "STRING",
            DataType::Double => "DOUBLE",
        }
    }

    /// Check if this type is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::Double)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        for ty in [DataType::Int, DataType::String, DataType::Double] {
            assert_eq!(DataType::from_token(ty.as_token()), ty);
        }
    }

    #[test]
    fn test_unknown_token_defaults_to_int() {
        assert_eq!(DataType::from_token("BLOB"), DataType::Int);
    }
}

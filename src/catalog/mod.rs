//! System catalog module
//!
//! Table metadata: data types, schemas, and the page-backed catalog that
//! persists them.

pub mod catalog;
pub mod schema;
pub mod types;

pub use catalog::{SystemCatalog, CATALOG_TABLE};
pub use schema::{Column, TableSchema};
pub use types::DataType;

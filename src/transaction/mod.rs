//! Transaction module
//!
//! MVCC version chains for per-row visibility under concurrent transactions.
//! Transaction lifecycle state lives with the host; the engine only stores
//! versions.

pub mod mvcc;

pub use mvcc::{TxId, VersionStore};

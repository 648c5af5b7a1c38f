//! stratadb - an embeddable relational storage and execution engine
//!
//! This library provides the core components of a small database kernel:
//! - Page-based row storage with a buffer cache
//! - System catalog persisted through the same page machinery
//! - Primary and composite in-memory indexes (the composite form durable
//!   via snapshot + write-ahead log)
//! - MVCC version chains for per-row visibility
//! - An operator engine (scan, filter, project, delete, update, joins,
//!   order-by, group-by)
//!
//! There is no SQL surface, network protocol, or CLI: the host issues typed
//! operator calls against [`executor::ExecutionEngine`].

pub mod catalog;
pub mod error;
pub mod executor;
pub mod storage;
pub mod transaction;

pub use error::{Error, Result};

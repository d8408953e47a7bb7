//! Data store access.
//!
//! The agent only ever reads: every connection is opened read-only and
//! lives for exactly one call.

pub mod sqlite;

pub use sqlite::{SqliteStore, flatten_query};

//! Maps JSON documents onto joined relational tables and back.
//!
//! An [`ObjectTree`] describes one document shape: a root table, nested
//! tables, and per-field flags. Reads render a single SQL statement whose
//! result rows are complete JSON documents; writes walk a document in
//! lock-step with the tree and emit the INSERT/UPDATE/DELETE statements
//! that reconcile the database with it. All database access goes through
//! the caller-supplied [`Session`].

mod digest;
pub use digest::{digest, digest_traced, post_process_json};

mod mutation;
pub use mutation::{Mutator, StealPolicy};

mod read;
pub use read::Reader;

mod session;
pub use session::Session;

pub mod testing;

pub use dovetail_core::{
    ColumnType, Error, FieldFilter, ObjectTree, PrimaryKeyColumnValues, Result, RowOwnership,
    SqlLiteral, TreeBuilder,
};
pub use dovetail_sql::RowFilter;

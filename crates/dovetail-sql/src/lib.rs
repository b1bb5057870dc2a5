//! SQL rendering for dovetail, MySQL dialect.
//!
//! Two surfaces: single-table DML statements ([`Insert`], [`Update`],
//! [`Delete`], [`RowSelect`]) used by the mutation engine, and the
//! document query builder ([`DocSelect`]) that turns an object tree into
//! one SELECT whose rows carry nested JSON documents.

#[macro_use]
mod fmt;

mod doc;
pub use doc::{DocSelect, RowFilter};

mod stmt;
pub use stmt::{Conjunction, Delete, Insert, RowSelect, Update};

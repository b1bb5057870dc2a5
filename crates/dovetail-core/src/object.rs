mod builder;
mod field;
mod source;
mod tree;
mod verify;

pub use builder::{ColumnBuilder, JoinBuilder, TreeBuilder};
pub use field::ObjectField;
pub use source::{BaseTable, FieldSource, JoinedTable, TableCaps};
pub use tree::{Object, ObjectId, ObjectTree, SourceId};

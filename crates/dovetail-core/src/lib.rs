#[macro_use]
mod macros;

mod error;
pub use error::Error;

pub mod filter;
pub use filter::{FieldFilter, FilterView};

pub mod object;
pub use object::{
    BaseTable, ColumnBuilder, FieldSource, JoinBuilder, JoinedTable, Object, ObjectField,
    ObjectId, ObjectTree, SourceId, TableCaps, TreeBuilder,
};

pub mod ownership;
pub use ownership::RowOwnership;

pub mod value;
pub use value::{ColumnType, PrimaryKeyColumnValues, SqlLiteral};

/// A Result type alias that uses dovetail's [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;

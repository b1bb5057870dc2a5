use crate::object::{ObjectId, SourceId};
use crate::value::{self, ColumnType, SqlLiteral};
use crate::Result;

use serde_json::Value;

/// One key of a mapped JSON object.
///
/// A field either maps a column of its source table or holds a nested
/// object (`nested` is set and `column` is `None`).
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectField {
    /// The JSON key.
    pub name: String,

    /// The mapped column, `None` for nested-object fields.
    pub column: Option<String>,

    /// The table this field reads from and writes to.
    pub source: SourceId,

    /// The child object, for fields that hold one.
    pub nested: Option<ObjectId>,

    pub ty: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,

    /// Generated on insert as a reversed UUIDv4, rendered to JSON as
    /// Base64. Only meaningful on 16-byte binary columns.
    pub rev_uuid: bool,

    /// Filled from the caller identity instead of the document.
    pub owner: bool,

    /// Excluded from documents entirely: never selected, never accepted
    /// in input, never checksummed.
    pub disabled: bool,

    /// Per-field override of the table's checksum default.
    pub check: Option<bool>,

    /// Accepted in input only if unchanged.
    pub no_update: bool,

    pub unique: bool,
    pub sortable: bool,
    pub no_filter: bool,
}

impl ObjectField {
    pub fn is_nested(&self) -> bool {
        self.nested.is_some()
    }

    /// The mapped column name. Panics on nested-object fields, which by
    /// construction have none.
    pub fn expect_column(&self) -> &str {
        match &self.column {
            Some(column) => column,
            None => panic!("field `{}` does not map a column", self.name),
        }
    }

    /// Whether this field participates in the document checksum, given
    /// its table's default.
    pub fn checked(&self, table_check: Option<bool>) -> bool {
        if self.disabled {
            return false;
        }
        if let Some(explicit) = self.check {
            return explicit;
        }
        if self.primary_key {
            return true;
        }
        table_check.unwrap_or(true)
    }

    /// Whether the engine produces this field's value on insert, so the
    /// document need not carry it.
    pub fn generated(&self) -> bool {
        self.auto_increment || self.rev_uuid || self.owner
    }

    /// Renders a document value as a SQL literal for this field's column.
    pub fn literal(&self, input: &Value, table: &str) -> Result<SqlLiteral> {
        match value::literal(self.ty, input) {
            Some(lit) => Ok(lit),
            None => bail_input!(
                "Invalid value for field `{}` in table `{}`",
                self.name,
                table
            ),
        }
    }
}

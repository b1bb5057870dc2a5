/// Write capabilities granted to a mapped table.
///
/// A table with no capabilities is read-only. `check` is the table-level
/// default for whether its columns participate in the document checksum;
/// individual fields may override it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCaps {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
    pub check: Option<bool>,
}

impl TableCaps {
    pub fn writable(&self) -> bool {
        self.insert || self.update || self.delete
    }
}

/// The table at the root of an object tree.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseTable {
    pub schema: String,
    pub table: String,
    pub caps: TableCaps,
}

/// A table joined into the tree under some parent object.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedTable {
    pub schema: String,
    pub table: String,

    /// Equi-join pairs of `(column on this table, column on the parent's
    /// table)`.
    pub column_mapping: Vec<(String, String)>,

    /// One parent row maps to an array of rows from this table.
    pub to_many: bool,

    /// This table's columns appear inline in the parent object instead of
    /// under a nested key.
    pub unnest: bool,

    pub caps: TableCaps,

    /// Collapse the mapped rows to the values of this one field: an array
    /// of scalars for a to-many join, a single scalar for an unnested
    /// to-one join.
    pub reduce_to_field: Option<String>,

    /// Whether the mapping's parent columns are the parent table's primary
    /// key. True means rows of this table carry the foreign key (owned
    /// children, inserted after the parent); false means the parent row
    /// points at a row here (a referenced to-one, inserted first).
    pub references_parent: bool,
}

/// Where an object's fields come from: its own base table or a table
/// joined to an ancestor.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSource {
    Base(BaseTable),
    Joined(JoinedTable),
}

impl FieldSource {
    pub fn schema(&self) -> &str {
        match self {
            FieldSource::Base(base) => &base.schema,
            FieldSource::Joined(joined) => &joined.schema,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            FieldSource::Base(base) => &base.table,
            FieldSource::Joined(joined) => &joined.table,
        }
    }

    pub fn caps(&self) -> &TableCaps {
        match self {
            FieldSource::Base(base) => &base.caps,
            FieldSource::Joined(joined) => &joined.caps,
        }
    }

    pub fn as_joined(&self) -> Option<&JoinedTable> {
        match self {
            FieldSource::Joined(joined) => Some(joined),
            FieldSource::Base(_) => None,
        }
    }

    pub fn is_base(&self) -> bool {
        matches!(self, FieldSource::Base(_))
    }
}

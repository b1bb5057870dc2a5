//! The mutation engine: reconciles JSON documents with the rows that
//! store them.
//!
//! Every write runs in two stages. `check` walks the document in
//! lock-step with the tree and rejects structural problems before any
//! statement runs; execution then emits the INSERT/UPDATE/DELETE
//! statements that bring the database in line with the document,
//! enforcing per-table capability flags against fetched row state as it
//! goes.

mod check;
mod delete;
mod insert;
mod update;

use crate::Session;

use dovetail_core::value::column_text_to_json;
use dovetail_core::{
    bail_duality, bail_input, ColumnType, Object, ObjectTree, PrimaryKeyColumnValues, Result,
    RowOwnership, SourceId, SqlLiteral,
};
use dovetail_sql::{Conjunction, RowFilter};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

/// What to do when a to-many element's ID already lives under a
/// different parent document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StealPolicy {
    /// Re-point the row's foreign key at this parent. Requires the
    /// table's `update` capability.
    #[default]
    Allow,
    /// Raise a duality-view error.
    Deny,
}

/// Writes documents of one tree.
pub struct Mutator<'a> {
    tree: &'a ObjectTree,
    ownership: Option<&'a RowOwnership>,
    steal: StealPolicy,
}

impl<'a> Mutator<'a> {
    pub fn new(tree: &'a ObjectTree) -> Self {
        Self {
            tree,
            ownership: None,
            steal: StealPolicy::default(),
        }
    }

    pub fn ownership(mut self, ownership: Option<&'a RowOwnership>) -> Self {
        self.ownership = ownership;
        self
    }

    pub fn steal_policy(mut self, steal: StealPolicy) -> Self {
        self.steal = steal;
        self
    }

    /// Structural validation of `document` against the tree, without
    /// touching the database. Execution re-checks anything that depends
    /// on current row state.
    pub fn check(&self, document: &Value, for_update: bool) -> Result<()> {
        check::document(self.tree, document, for_update)
    }

    /// Inserts the document depth-first. Returns the root row's
    /// resolved primary key.
    pub fn insert(
        &self,
        session: &mut dyn Session,
        document: &Value,
    ) -> Result<PrimaryKeyColumnValues> {
        self.check(document, false)?;
        insert::root(self, session, document)
    }

    /// Replaces the document stored under `key`, PUT style: scalars are
    /// updated where they differ, nested rows are inserted, updated,
    /// deleted, or abandoned to match the document. Returns `None` when
    /// no row matches under the active ownership.
    pub fn update(
        &self,
        session: &mut dyn Session,
        key: &PrimaryKeyColumnValues,
        document: &Value,
    ) -> Result<Option<PrimaryKeyColumnValues>> {
        self.check(document, true)?;
        update::root(self, session, key, document)
    }

    /// Deletes the document stored under `key`, cascading through the
    /// tree. Returns the number of root rows removed.
    pub fn delete(&self, session: &mut dyn Session, key: &PrimaryKeyColumnValues) -> Result<u64> {
        delete::by_key(self, session, key)
    }

    /// Deletes every document whose root row matches `row_filter`.
    pub fn delete_matching(
        &self,
        session: &mut dyn Session,
        row_filter: &dyn RowFilter,
    ) -> Result<u64> {
        delete::matching(self, session, row_filter)
    }
}

/// Column values one table receives, in field declaration order.
type ColumnValues = IndexMap<String, SqlLiteral>;

fn run(session: &mut dyn Session, sql: &str) -> Result<u64> {
    debug!(sql = %sql, "execute");
    session.execute(sql)
}

fn query_one(session: &mut dyn Session, sql: &str) -> Result<Option<Vec<Option<String>>>> {
    debug!(sql = %sql, "query");
    session.query_one(sql)
}

fn collect(session: &mut dyn Session, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
    debug!(sql = %sql, "query");
    let mut rows = vec![];
    session.query(sql, &mut |row| {
        rows.push(row.to_vec());
        Ok(())
    })?;
    Ok(rows)
}

fn require_insert(tree: &ObjectTree, source: SourceId) -> Result<()> {
    if !tree.source(source).caps().insert {
        bail_duality!("Table `{}` does not allow INSERT", tree.table_name(source));
    }
    Ok(())
}

fn require_update(tree: &ObjectTree, source: SourceId) -> Result<()> {
    if !tree.source(source).caps().update {
        bail_duality!("Table `{}` does not allow UPDATE", tree.table_name(source));
    }
    Ok(())
}

fn require_delete(tree: &ObjectTree, source: SourceId) -> Result<()> {
    if !tree.source(source).caps().delete {
        bail_duality!("Table `{}` does not allow DELETE", tree.table_name(source));
    }
    Ok(())
}

/// Adds the owner predicate when the object's root table maps an owner
/// field.
fn ownership_term(m: &Mutator<'_>, object: &Object, filter: &mut Conjunction) {
    if let (Some(ownership), Some(owner)) = (m.ownership, object.owner_field()) {
        if owner.source == object.root_source {
            filter.push(owner.expect_column(), ownership.user_id().clone());
        }
    }
}

/// The literals a document supplies for `source`'s columns, in field
/// declaration order. Owner fields are never taken from the document.
fn scalar_values(
    tree: &ObjectTree,
    object: &Object,
    map: &Map<String, Value>,
    source: SourceId,
) -> Result<ColumnValues> {
    let table = tree.table_name(source);
    let mut values = IndexMap::new();
    for field in &object.fields {
        if field.is_nested() || field.disabled || field.owner || field.source != source {
            continue;
        }
        if let Some(value) = map.get(&field.name) {
            values.insert(field.expect_column().to_string(), field.literal(value, table)?);
        }
    }
    Ok(values)
}

/// The parent row's known column values: its fetched document fields
/// plus the key. Child foreign keys resolve against these.
fn parent_columns(
    tree: &ObjectTree,
    object: &Object,
    map: &Map<String, Value>,
    key: &[(String, SqlLiteral)],
) -> ColumnValues {
    let table = tree.table_name(object.root_source);
    let mut out: ColumnValues = IndexMap::new();
    for field in &object.fields {
        if field.is_nested() || field.disabled || field.source != object.root_source {
            continue;
        }
        let Some(value) = map.get(&field.name) else {
            continue;
        };
        if let Ok(literal) = field.literal(value, table) {
            out.insert(field.expect_column().to_string(), literal);
        }
    }
    for (column, value) in key {
        out.insert(column.clone(), value.clone());
    }
    out
}

/// Foreign-key columns a child row receives from its parent.
fn fk_values(
    tree: &ObjectTree,
    child_source: SourceId,
    parent: &ColumnValues,
) -> Result<Vec<(String, SqlLiteral)>> {
    let joined = tree.joined(child_source);
    let mut forced = vec![];
    for (local, parent_col) in &joined.column_mapping {
        let Some(value) = parent.get(parent_col) else {
            bail_input!("ID `{parent_col}` missing");
        };
        forced.push((local.clone(), value.clone()));
    }
    Ok(forced)
}

/// The key terms identifying a fetched document's root row.
fn document_key(
    tree: &ObjectTree,
    object: &Object,
    doc: &Value,
) -> Result<Vec<(String, SqlLiteral)>> {
    let table = tree.table_name(object.root_source);
    let Some(map) = doc.as_object() else {
        bail_input!("Invalid document in JSON input for table `{table}`");
    };
    let mut key = vec![];
    for field in object.pk_fields() {
        let Some(value) = map.get(&field.name) else {
            bail_input!("ID `{}` missing", field.expect_column());
        };
        key.push((field.expect_column().to_string(), field.literal(value, table)?));
    }
    Ok(key)
}

fn cell_json(ty: ColumnType, cell: Option<&Option<String>>) -> Result<Value> {
    match cell.and_then(|cell| cell.as_deref()) {
        Some(text) => column_text_to_json(ty, text),
        None => Ok(Value::Null),
    }
}

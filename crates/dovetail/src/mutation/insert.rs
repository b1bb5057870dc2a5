use super::{
    cell_json, fk_values, query_one, require_insert, require_update, run, scalar_values,
    ColumnValues, Mutator,
};
use crate::Session;

use dovetail_core::value::values_equal;
use dovetail_core::{
    bail_duality, bail_input, Object, ObjectField, PrimaryKeyColumnValues, Result, SourceId,
    SqlLiteral,
};
use dovetail_sql::{Insert, RowSelect, Update};

use serde_json::{Map, Value};
use uuid::Uuid;

pub(super) fn root(
    m: &Mutator<'_>,
    session: &mut dyn Session,
    document: &Value,
) -> Result<PrimaryKeyColumnValues> {
    let object = m.tree.root();
    let resolved = insert_object(m, session, object, document, &[])?;
    let mut key = PrimaryKeyColumnValues::new();
    for field in object.pk_fields() {
        let column = field.expect_column();
        if let Some(value) = resolved.get(column) {
            key.insert(column, value.clone());
        }
    }
    Ok(key)
}

/// Inserts one object's rows: referenced rows first, then the object's
/// own row, then owned side rows and child documents. Returns the
/// resolved column values of the object's root table.
pub(super) fn insert_object(
    m: &Mutator<'_>,
    session: &mut dyn Session,
    object: &Object,
    document: &Value,
    forced: &[(String, SqlLiteral)],
) -> Result<ColumnValues> {
    let tree = m.tree;
    let source = tree.source(object.root_source);
    let table = tree.table_name(object.root_source);
    let Some(map) = document.as_object() else {
        bail_input!("Invalid document in JSON input for table `{table}`");
    };
    require_insert(tree, object.root_source)?;

    let mut values = scalar_values(tree, object, map, object.root_source)?;
    for (column, value) in forced {
        values.insert(column.clone(), value.clone());
    }
    if let (Some(ownership), Some(owner)) = (m.ownership, object.owner_field()) {
        if owner.source == object.root_source {
            values.insert(owner.expect_column().to_string(), ownership.user_id().clone());
        }
    }

    // Referenced rows exist before the row that points at them.
    for field in object.nested_fields() {
        let Some(child_id) = field.nested else { continue };
        let child = &tree[child_id];
        let joined = tree.joined(child.root_source);
        if joined.to_many || joined.references_parent {
            continue;
        }
        let Some(value) = map.get(&field.name) else { continue };
        if value.is_null() {
            continue;
        }
        let resolved = ensure_row(m, session, child, value)?;
        for (local, parent_col) in &joined.column_mapping {
            if let Some(value) = resolved.get(local.as_str()) {
                values.insert(parent_col.clone(), value.clone());
            }
        }
    }
    for id in object.unnested_sources() {
        if !tree.joined(id).references_parent {
            ensure_unnested(m, session, object, id, map, &values)?;
        }
    }

    let mut auto_column = None;
    for field in object.pk_fields() {
        let column = field.expect_column();
        if values.contains_key(column) {
            continue;
        }
        if field.auto_increment {
            auto_column = Some(column.to_string());
        } else if field.rev_uuid {
            values.insert(column.to_string(), SqlLiteral::bytes(&rev_uuid()));
        } else {
            bail_input!("ID `{column}` missing");
        }
    }
    let mut stmt = Insert::new(source.schema(), source.table());
    for (column, value) in &values {
        stmt.push(column.as_str(), value.clone());
    }
    run(session, &stmt.render())?;
    if let Some(column) = auto_column {
        let id = session.last_insert_id()?;
        values.insert(column, SqlLiteral::from(id));
    }

    // Owned side rows carry the parent key.
    for id in object.unnested_sources() {
        let joined = tree.joined(id);
        if !joined.references_parent {
            continue;
        }
        let side = scalar_values(tree, object, map, id)?;
        if side.is_empty() {
            continue;
        }
        require_insert(tree, id)?;
        let mut stmt = Insert::new(joined.schema.as_str(), joined.table.as_str());
        for (local, parent_col) in &joined.column_mapping {
            let Some(value) = values.get(parent_col.as_str()) else {
                bail_input!("ID `{parent_col}` missing");
            };
            stmt.push(local.as_str(), value.clone());
        }
        for (column, value) in &side {
            if joined.column_mapping.iter().any(|(local, _)| local == column) {
                continue;
            }
            stmt.push(column.as_str(), value.clone());
        }
        run(session, &stmt.render())?;
    }

    // Child documents.
    for field in object.nested_fields() {
        let Some(child_id) = field.nested else { continue };
        let child = &tree[child_id];
        let joined = tree.joined(child.root_source);
        let Some(value) = map.get(&field.name) else { continue };
        if joined.to_many {
            let Some(items) = value.as_array() else { continue };
            let forced = fk_values(tree, child.root_source, &values)?;
            match &joined.reduce_to_field {
                Some(target) => {
                    for item in items {
                        let mut element = Map::new();
                        element.insert(target.clone(), item.clone());
                        insert_object(m, session, child, &Value::Object(element), &forced)?;
                    }
                }
                None => {
                    for item in items {
                        insert_object(m, session, child, item, &forced)?;
                    }
                }
            }
        } else if joined.references_parent && !value.is_null() {
            let forced = fk_values(tree, child.root_source, &values)?;
            insert_object(m, session, child, value, &forced)?;
        }
    }

    Ok(values)
}

/// A referenced row: reuse it when the document names its key, updating
/// fields that drifted, insert it otherwise.
pub(super) fn ensure_row(
    m: &Mutator<'_>,
    session: &mut dyn Session,
    child: &Object,
    document: &Value,
) -> Result<ColumnValues> {
    let tree = m.tree;
    let table = tree.table_name(child.root_source);
    let Some(map) = document.as_object() else {
        bail_input!("Invalid document in JSON input for table `{table}`");
    };

    let mut key = vec![];
    for field in child.pk_fields() {
        match map.get(&field.name) {
            Some(value) if !value.is_null() => {
                key.push((field.expect_column().to_string(), field.literal(value, table)?));
            }
            _ => {
                key.clear();
                break;
            }
        }
    }
    if key.is_empty() {
        return insert_object(m, session, child, document, &[]);
    }

    reconcile_row(m, session, child, child.root_source, &key, map)?;
    let mut resolved = scalar_values(tree, child, map, child.root_source)?;
    for (column, value) in key {
        resolved.insert(column, value);
    }
    Ok(resolved)
}

/// SELECTs the row by key, updates the columns that differ, or inserts
/// it when absent. `object` supplies the fields, filtered to `source`,
/// so this serves both nested objects and spliced side tables.
fn reconcile_row(
    m: &Mutator<'_>,
    session: &mut dyn Session,
    object: &Object,
    source: SourceId,
    key: &[(String, SqlLiteral)],
    map: &Map<String, Value>,
) -> Result<()> {
    let tree = m.tree;
    let table = tree.table_name(source);
    let src = tree.source(source);
    let fields: Vec<&ObjectField> = object
        .fields
        .iter()
        .filter(|field| !field.is_nested() && !field.disabled && field.source == source)
        .collect();

    let mut probe = RowSelect::new(src.schema(), src.table());
    for field in &fields {
        probe.push_field(field);
    }
    for (column, value) in key {
        probe.filter.push(column.as_str(), value.clone());
    }

    let Some(row) = query_one(session, &probe.render())? else {
        require_insert(tree, source)?;
        let mut stmt = Insert::new(src.schema(), src.table());
        for (column, value) in key {
            stmt.push(column.as_str(), value.clone());
        }
        for field in &fields {
            let column = field.expect_column();
            if key.iter().any(|(k, _)| k == column) || field.owner {
                continue;
            }
            if let Some(value) = map.get(&field.name) {
                stmt.push(column, field.literal(value, table)?);
            }
        }
        run(session, &stmt.render())?;
        return Ok(());
    };

    let mut stmt = Update::new(src.schema(), src.table());
    for (i, field) in fields.iter().enumerate() {
        let column = field.expect_column();
        if key.iter().any(|(k, _)| k == column) || field.owner {
            continue;
        }
        let Some(after) = map.get(&field.name) else { continue };
        let before = cell_json(field.ty, row.get(i))?;
        if values_equal(field.ty, &before, after) {
            continue;
        }
        if field.no_update {
            bail_duality!("Field `{}` in table `{table}` cannot be updated", field.name);
        }
        stmt.push(column, field.literal(after, table)?);
    }
    if !stmt.is_empty() {
        require_update(tree, source)?;
        for (column, value) in key {
            stmt.filter.push(column.as_str(), value.clone());
        }
        run(session, &stmt.render())?;
    }
    Ok(())
}

/// A referenced side table: the row the spliced fields describe must
/// exist before the parent row points at it.
fn ensure_unnested(
    m: &Mutator<'_>,
    session: &mut dyn Session,
    object: &Object,
    source: SourceId,
    map: &Map<String, Value>,
    parent_values: &ColumnValues,
) -> Result<()> {
    let tree = m.tree;
    let joined = tree.joined(source);
    let side = scalar_values(tree, object, map, source)?;
    if side.is_empty() {
        return Ok(());
    }
    let mut key = vec![];
    for (local, parent_col) in &joined.column_mapping {
        let Some(value) = parent_values.get(parent_col.as_str()) else {
            bail_input!("ID `{parent_col}` missing");
        };
        key.push((local.clone(), value.clone()));
    }
    reconcile_row(m, session, object, source, &key, map)
}

/// A v4 UUID with its byte order reversed.
fn rev_uuid() -> [u8; 16] {
    let mut bytes = *Uuid::new_v4().as_bytes();
    bytes.reverse();
    bytes
}

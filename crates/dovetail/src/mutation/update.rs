use super::{
    cell_json, check, delete, document_key, fk_values, insert, ownership_term, parent_columns,
    query_one, require_delete, require_insert, require_update, run, Mutator, StealPolicy,
};
use crate::{Reader, Session};

use dovetail_core::value::values_equal;
use dovetail_core::{
    bail_duality, bail_input, Object, ObjectField, PrimaryKeyColumnValues, Result, SqlLiteral,
};
use dovetail_sql::{Delete, Insert, RowSelect, Update};

use indexmap::IndexMap;
use serde_json::{Map, Value};

pub(super) fn root(
    m: &Mutator<'_>,
    session: &mut dyn Session,
    key: &PrimaryKeyColumnValues,
    document: &Value,
) -> Result<Option<PrimaryKeyColumnValues>> {
    let tree = m.tree;
    let object = tree.root();
    let table = tree.table_name(object.root_source);
    let Some(map) = document.as_object() else {
        bail_input!("Invalid document in JSON input for table `{table}`");
    };

    let mut key_terms = vec![];
    for field in object.pk_fields() {
        let column = field.expect_column();
        let Some(expected) = key.get(column) else {
            bail_input!("ID `{column}` missing");
        };
        if let Some(value) = map.get(&field.name) {
            if field.literal(value, table)?.as_str() != expected.as_str() {
                bail_input!("ID `{column}` cannot be changed");
            }
        }
        key_terms.push((column.to_string(), expected.clone()));
    }

    let Some(before) = Reader::new(tree).ownership(m.ownership).one(session, key)? else {
        return Ok(None);
    };
    diff_object(m, session, object, &before, document, &key_terms)?;
    Ok(Some(key.clone()))
}

/// Reconciles one stored row and its subtree with the replacement
/// document. `before` is the fetched document for the row; `key`
/// identifies the row itself.
fn diff_object(
    m: &Mutator<'_>,
    session: &mut dyn Session,
    object: &Object,
    before: &Value,
    after: &Value,
    key: &[(String, SqlLiteral)],
) -> Result<()> {
    let tree = m.tree;
    let source = object.root_source;
    let table = tree.table_name(source);
    let src = tree.source(source);
    let empty = Map::new();
    let before_map = before.as_object().unwrap_or(&empty);
    let Some(after_map) = after.as_object() else {
        bail_input!("Invalid document in JSON input for table `{table}`");
    };
    let parents = parent_columns(tree, object, before_map, key);

    // Referenced to-one targets settle first; re-pointing folds into the
    // row's own UPDATE.
    let mut stmt = Update::new(src.schema(), src.table());
    for field in object.nested_fields() {
        let Some(child_id) = field.nested else { continue };
        let child = &tree[child_id];
        let joined = tree.joined(child.root_source);
        if joined.to_many || joined.references_parent {
            continue;
        }
        let Some(after_child) = after_map.get(&field.name) else { continue };
        if after_child.is_null() {
            if before_map.get(&field.name).is_some_and(|b| !b.is_null()) {
                for (_, parent_col) in &joined.column_mapping {
                    stmt.push(parent_col.as_str(), SqlLiteral::null());
                }
            }
            continue;
        }
        let resolved = insert::ensure_row(m, session, child, after_child)?;
        for (local, parent_col) in &joined.column_mapping {
            let Some(new_value) = resolved.get(local.as_str()) else { continue };
            if parents.get(parent_col.as_str()).map(SqlLiteral::as_str) != Some(new_value.as_str())
            {
                stmt.push(parent_col.as_str(), new_value.clone());
            }
        }
    }

    for field in &object.fields {
        if field.is_nested()
            || field.disabled
            || field.owner
            || field.primary_key
            || field.source != source
        {
            continue;
        }
        let Some(after_value) = after_map.get(&field.name) else { continue };
        let before_value = before_map.get(&field.name).unwrap_or(&Value::Null);
        if values_equal(field.ty, before_value, after_value) {
            continue;
        }
        if field.no_update {
            bail_duality!("Field `{}` in table `{table}` cannot be updated", field.name);
        }
        stmt.push(field.expect_column(), field.literal(after_value, table)?);
    }
    if !stmt.is_empty() {
        require_update(tree, source)?;
        for (column, value) in key {
            stmt.filter.push(column.as_str(), value.clone());
        }
        ownership_term(m, object, &mut stmt.filter);
        run(session, &stmt.render())?;
    }

    // Spliced side tables, keyed through the mapping.
    for id in object.unnested_sources() {
        let joined = tree.joined(id);
        let side_table = tree.table_name(id);
        let mut changed = Update::new(joined.schema.as_str(), joined.table.as_str());
        for field in &object.fields {
            if field.is_nested() || field.disabled || field.source != id {
                continue;
            }
            let Some(after_value) = after_map.get(&field.name) else { continue };
            let before_value = before_map.get(&field.name).unwrap_or(&Value::Null);
            if values_equal(field.ty, before_value, after_value) {
                continue;
            }
            if field.no_update {
                bail_duality!(
                    "Field `{}` in table `{side_table}` cannot be updated",
                    field.name
                );
            }
            changed.push(field.expect_column(), field.literal(after_value, side_table)?);
        }
        if changed.is_empty() {
            continue;
        }
        require_update(tree, id)?;
        for (local, parent_col) in &joined.column_mapping {
            let Some(value) = parents.get(parent_col.as_str()) else {
                bail_input!("ID `{parent_col}` missing");
            };
            changed.filter.push(local.as_str(), value.clone());
        }
        run(session, &changed.render())?;
    }

    // Owned to-one children.
    for field in object.nested_fields() {
        let Some(child_id) = field.nested else { continue };
        let child = &tree[child_id];
        let joined = tree.joined(child.root_source);
        if joined.to_many || !joined.references_parent {
            continue;
        }
        let Some(after_child) = after_map.get(&field.name) else { continue };
        let before_child = before_map.get(&field.name).filter(|b| b.is_object());
        if after_child.is_null() {
            if let Some(before_child) = before_child {
                require_delete(tree, child.root_source)?;
                let child_key = document_key(tree, child, before_child)?;
                delete::document(m, session, child, before_child, &child_key)?;
            }
            continue;
        }
        if !after_child.is_object() {
            continue;
        }
        let child_table = tree.table_name(child.root_source);
        let after_key = check::explicit_key(child, after_child, child_table);
        let same_row = before_child.filter(|before_child| {
            after_key.is_some() && check::explicit_key(child, before_child, child_table) == after_key
        });
        if let Some(before_child) = same_row {
            let child_key = document_key(tree, child, before_child)?;
            diff_object(m, session, child, before_child, after_child, &child_key)?;
        } else {
            if let Some(before_child) = before_child {
                require_delete(tree, child.root_source)?;
                let child_key = document_key(tree, child, before_child)?;
                delete::document(m, session, child, before_child, &child_key)?;
            }
            check::subtree(tree, child, after_child)?;
            let forced = fk_values(tree, child.root_source, &parents)?;
            insert::insert_object(m, session, child, after_child, &forced)?;
        }
    }

    // To-many children.
    for field in object.nested_fields() {
        let Some(child_id) = field.nested else { continue };
        let child = &tree[child_id];
        let joined = tree.joined(child.root_source);
        if !joined.to_many {
            continue;
        }
        let Some(after_items) = after_map.get(&field.name).and_then(Value::as_array) else {
            continue;
        };
        let before_items: &[Value] = before_map
            .get(&field.name)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let forced = fk_values(tree, child.root_source, &parents)?;
        match &joined.reduce_to_field {
            Some(target) => {
                diff_reduced(m, session, child, target, before_items, after_items, &forced)?;
            }
            None => diff_elements(m, session, child, before_items, after_items, &forced)?,
        }
    }
    Ok(())
}

/// Element-wise reconciliation of a to-many array, matched on explicit
/// primary keys.
fn diff_elements(
    m: &Mutator<'_>,
    session: &mut dyn Session,
    child: &Object,
    before_items: &[Value],
    after_items: &[Value],
    forced: &[(String, SqlLiteral)],
) -> Result<()> {
    let tree = m.tree;
    let table = tree.table_name(child.root_source);
    let mut stored: IndexMap<Vec<String>, &Value> = IndexMap::new();
    for item in before_items {
        if let Some(key) = check::explicit_key(child, item, table) {
            stored.insert(key, item);
        }
    }

    for item in after_items {
        match check::explicit_key(child, item, table) {
            None => {
                check::subtree(tree, child, item)?;
                insert::insert_object(m, session, child, item, forced)?;
            }
            Some(rendered) => {
                if let Some(before_item) = stored.shift_remove(&rendered) {
                    let key = document_key(tree, child, before_item)?;
                    diff_object(m, session, child, before_item, item, &key)?;
                } else {
                    adopt(m, session, child, item, &rendered, forced)?;
                }
            }
        }
    }

    // Rows the document no longer contains.
    let caps = *tree.source(child.root_source).caps();
    for (_, item) in stored {
        if caps.delete {
            let key = document_key(tree, child, item)?;
            delete::document(m, session, child, item, &key)?;
        } else if caps.update {
            let joined = tree.joined(child.root_source);
            let mut stmt = Update::new(joined.schema.as_str(), joined.table.as_str());
            for (local, _) in &joined.column_mapping {
                stmt.push(local.as_str(), SqlLiteral::null());
            }
            for (column, value) in document_key(tree, child, item)? {
                stmt.filter.push(column, value);
            }
            run(session, &stmt.render())?;
        } else {
            bail_duality!("Table `{table}` does not allow DELETE");
        }
    }
    Ok(())
}

/// A document element whose key is not among this parent's rows: adopt
/// the row from wherever it lives, or insert it when it exists nowhere.
fn adopt(
    m: &Mutator<'_>,
    session: &mut dyn Session,
    child: &Object,
    item: &Value,
    rendered: &[String],
    forced: &[(String, SqlLiteral)],
) -> Result<()> {
    let tree = m.tree;
    let source = child.root_source;
    let src = tree.source(source);
    let table = tree.table_name(source);

    let key = document_key(tree, child, item)?;
    let fields: Vec<&ObjectField> = child
        .fields
        .iter()
        .filter(|field| !field.is_nested() && !field.disabled && field.source == source)
        .collect();
    let mut probe = RowSelect::new(src.schema(), src.table());
    for field in &fields {
        probe.push_field(field);
    }
    for (column, value) in &key {
        probe.filter.push(column.as_str(), value.clone());
    }

    let Some(row) = query_one(session, &probe.render())? else {
        check::subtree(tree, child, item)?;
        insert::insert_object(m, session, child, item, forced)?;
        return Ok(());
    };

    if m.steal == StealPolicy::Deny {
        bail_duality!(
            "Row `{}` of table `{table}` belongs to another document",
            rendered.join(", ")
        );
    }

    require_update(tree, source)?;
    let Some(map) = item.as_object() else {
        bail_input!("Invalid document in JSON input for table `{table}`");
    };
    let mut stmt = Update::new(src.schema(), src.table());
    for (column, value) in forced {
        stmt.push(column.as_str(), value.clone());
    }
    for (i, field) in fields.iter().enumerate() {
        let column = field.expect_column();
        if key.iter().any(|(k, _)| k == column) {
            continue;
        }
        if forced.iter().any(|(k, _)| k == column) {
            continue;
        }
        if field.owner {
            continue;
        }
        let Some(after_value) = map.get(&field.name) else { continue };
        let before_value = cell_json(field.ty, row.get(i))?;
        if values_equal(field.ty, &before_value, after_value) {
            continue;
        }
        if field.no_update {
            bail_duality!("Field `{}` in table `{table}` cannot be updated", field.name);
        }
        stmt.push(column, field.literal(after_value, table)?);
    }
    for (column, value) in &key {
        stmt.filter.push(column.as_str(), value.clone());
    }
    run(session, &stmt.render())?;
    Ok(())
}

/// Set reconciliation of a reduced to-many array: junction rows are
/// inserted for values the database lacks and deleted for values the
/// document dropped.
fn diff_reduced(
    m: &Mutator<'_>,
    session: &mut dyn Session,
    child: &Object,
    target: &str,
    before_items: &[Value],
    after_items: &[Value],
    forced: &[(String, SqlLiteral)],
) -> Result<()> {
    let tree = m.tree;
    let source = child.root_source;
    let src = tree.source(source);
    let table = tree.table_name(source);
    let Some(reduced) = child.field(target) else {
        return Ok(());
    };
    let column = reduced.expect_column();

    let mut stored: IndexMap<String, SqlLiteral> = IndexMap::new();
    for item in before_items {
        if let Ok(literal) = reduced.literal(item, table) {
            stored.insert(literal.as_str().to_string(), literal);
        }
    }
    for item in after_items {
        let literal = reduced.literal(item, table)?;
        if stored.shift_remove(literal.as_str()).is_some() {
            continue;
        }
        require_insert(tree, source)?;
        let mut stmt = Insert::new(src.schema(), src.table());
        for (fk_column, value) in forced {
            stmt.push(fk_column.as_str(), value.clone());
        }
        stmt.push(column, literal);
        run(session, &stmt.render())?;
    }
    for (_, literal) in stored {
        require_delete(tree, source)?;
        let mut stmt = Delete::new(src.schema(), src.table());
        for (fk_column, value) in forced {
            stmt.filter.push(fk_column.as_str(), value.clone());
        }
        stmt.filter.push(column, literal);
        run(session, &stmt.render())?;
    }
    Ok(())
}

use super::{
    collect, document_key, ownership_term, parent_columns, require_delete, run, Mutator,
};
use crate::{Reader, Session};

use dovetail_core::{bail_input, Object, PrimaryKeyColumnValues, Result, SqlLiteral};
use dovetail_sql::{Delete, DocSelect, RowFilter};

use serde_json::{Map, Value};

pub(super) fn by_key(
    m: &Mutator<'_>,
    session: &mut dyn Session,
    key: &PrimaryKeyColumnValues,
) -> Result<u64> {
    let tree = m.tree;
    let object = tree.root();
    require_delete(tree, object.root_source)?;
    let Some(doc) = Reader::new(tree).ownership(m.ownership).one(session, key)? else {
        return Ok(0);
    };
    let terms: Vec<(String, SqlLiteral)> = key
        .iter()
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect();
    document(m, session, object, &doc, &terms)
}

pub(super) fn matching(
    m: &Mutator<'_>,
    session: &mut dyn Session,
    row_filter: &dyn RowFilter,
) -> Result<u64> {
    let tree = m.tree;
    let object = tree.root();
    require_delete(tree, object.root_source)?;

    let select = DocSelect::all(tree)
        .ownership(m.ownership)
        .row_filter(row_filter);
    let rows = collect(session, &select.render()?)?;

    let mut removed = 0;
    for row in rows {
        let Some(Some(text)) = row.first() else { continue };
        let doc: Value = serde_json::from_str(text)?;
        let terms = document_key(tree, object, &doc)?;
        removed += document(m, session, object, &doc, &terms)?;
    }
    Ok(removed)
}

/// Deletes one fetched document depth-first: to-many subtrees, the row
/// itself, then the rows it pointed at. Descendant tables without the
/// delete capability are skipped in place. Returns the object's own
/// affected rows.
pub(super) fn document(
    m: &Mutator<'_>,
    session: &mut dyn Session,
    object: &Object,
    doc: &Value,
    key: &[(String, SqlLiteral)],
) -> Result<u64> {
    let tree = m.tree;
    let empty = Map::new();
    let map = doc.as_object().unwrap_or(&empty);
    let parents = parent_columns(tree, object, map, key);

    // Rows carrying this row's key go first.
    for field in object.nested_fields() {
        let Some(child_id) = field.nested else { continue };
        let child = &tree[child_id];
        let joined = tree.joined(child.root_source);
        if !joined.references_parent || !tree.source(child.root_source).caps().delete {
            continue;
        }
        if joined.to_many {
            let Some(items) = map.get(&field.name).and_then(Value::as_array) else {
                continue;
            };
            if joined.reduce_to_field.is_some() {
                if !items.is_empty() {
                    delete_mapped(m, session, joined, &parents)?;
                }
            } else {
                for item in items {
                    let child_terms = document_key(tree, child, item)?;
                    document(m, session, child, item, &child_terms)?;
                }
            }
        } else if let Some(child_doc) = map.get(&field.name).filter(|doc| doc.is_object()) {
            let child_terms = document_key(tree, child, child_doc)?;
            document(m, session, child, child_doc, &child_terms)?;
        }
    }
    for id in object.unnested_sources() {
        let joined = tree.joined(id);
        if joined.references_parent && tree.source(id).caps().delete {
            delete_mapped(m, session, joined, &parents)?;
        }
    }

    let src = tree.source(object.root_source);
    let mut stmt = Delete::new(src.schema(), src.table());
    for (column, value) in key {
        stmt.filter.push(column.as_str(), value.clone());
    }
    ownership_term(m, object, &mut stmt.filter);
    let affected = run(session, &stmt.render())?;

    // Rows this row pointed at go after it.
    for id in object.unnested_sources() {
        let joined = tree.joined(id);
        if !joined.references_parent && tree.source(id).caps().delete {
            delete_mapped(m, session, joined, &parents)?;
        }
    }
    for field in object.nested_fields() {
        let Some(child_id) = field.nested else { continue };
        let child = &tree[child_id];
        let joined = tree.joined(child.root_source);
        if joined.references_parent || !tree.source(child.root_source).caps().delete {
            continue;
        }
        let Some(child_doc) = map.get(&field.name) else { continue };
        if !child_doc.is_object() {
            continue;
        }
        let child_terms = document_key(tree, child, child_doc)?;
        document(m, session, child, child_doc, &child_terms)?;
    }

    Ok(affected)
}

/// One DELETE keyed through the join mapping.
fn delete_mapped(
    m: &Mutator<'_>,
    session: &mut dyn Session,
    joined: &dovetail_core::JoinedTable,
    parents: &super::ColumnValues,
) -> Result<u64> {
    let mut stmt = Delete::new(joined.schema.as_str(), joined.table.as_str());
    for (local, parent_col) in &joined.column_mapping {
        let Some(value) = parents.get(parent_col.as_str()) else {
            bail_input!("ID `{parent_col}` missing");
        };
        stmt.filter.push(local.as_str(), value.clone());
    }
    run(session, &stmt.render())
}

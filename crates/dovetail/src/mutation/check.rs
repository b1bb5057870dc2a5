use dovetail_core::{bail_input, Object, ObjectField, ObjectTree, Result};

use serde_json::Value;
use std::collections::HashSet;

/// Validates the document's shape against the tree: object nesting,
/// unknown keys, value types, required fields, duplicate element keys.
/// No database access here.
pub(super) fn document(tree: &ObjectTree, document: &Value, for_update: bool) -> Result<()> {
    let mode = Mode {
        for_update,
        full: !for_update,
    };
    object(tree, tree.root(), document, mode)
}

/// Full-document validation of one subtree, used when an update replaces
/// a nested row wholesale.
pub(super) fn subtree(tree: &ObjectTree, child: &Object, document: &Value) -> Result<()> {
    object(
        tree,
        child,
        document,
        Mode {
            for_update: false,
            full: true,
        },
    )
}

#[derive(Clone, Copy)]
struct Mode {
    /// The root row is addressed by key, so its primary key must be
    /// present even when generated.
    for_update: bool,
    /// Every checked field must be present. Inserts and full nested
    /// replacements; partial updates relax it.
    full: bool,
}

fn object(tree: &ObjectTree, object: &Object, document: &Value, mode: Mode) -> Result<()> {
    let table = tree.table_name(object.root_source);
    let Some(map) = document.as_object() else {
        bail_input!("Invalid document in JSON input for table `{table}`");
    };

    for key in map.keys() {
        let known = object
            .fields
            .iter()
            .any(|field| field.name == *key && !field.disabled);
        if !known {
            bail_input!("Unknown field `{key}` in JSON input for table `{table}`");
        }
    }

    for field in &object.fields {
        if field.disabled {
            continue;
        }
        let value = map.get(&field.name);

        if field.primary_key && value.is_none() {
            if mode.for_update || !field.generated() {
                bail_input!("ID `{}` missing", field.expect_column());
            }
            continue;
        }

        match (field.nested, value) {
            (None, Some(value)) => {
                if !field.owner {
                    field.literal(value, table)?;
                }
            }
            (None, None) => {
                let table_check = tree.source(field.source).caps().check;
                if mode.full && !field.generated() && field.checked(table_check) {
                    bail_input!("Field `{}` missing", field.name);
                }
            }
            (Some(child_id), Some(value)) => {
                nested(tree, &tree[child_id], field, value, table, mode)?;
            }
            (Some(_), None) => {}
        }
    }
    Ok(())
}

fn nested(
    tree: &ObjectTree,
    child: &Object,
    field: &ObjectField,
    value: &Value,
    table: &str,
    mode: Mode,
) -> Result<()> {
    let joined = tree.joined(child.root_source);
    let child_table = tree.table_name(child.root_source);

    // Referenced rows follow ensure semantics, so a partial document is
    // acceptable there even on insert.
    let child_mode = Mode {
        for_update: false,
        full: mode.full && joined.references_parent,
    };

    if !joined.to_many {
        return match value {
            Value::Null if field.nullable => Ok(()),
            Value::Object(_) => object(tree, child, value, child_mode),
            _ => bail_input!("Invalid value for field `{}` in table `{table}`", field.name),
        };
    }

    let Some(items) = value.as_array() else {
        bail_input!("Invalid value for field `{}` in table `{table}`", field.name);
    };

    if let Some(target) = &joined.reduce_to_field {
        let Some(reduced) = child.field(target) else {
            return Ok(());
        };
        let mut seen = HashSet::new();
        for item in items {
            if item.is_null() || item.is_object() || item.is_array() {
                bail_input!("Invalid document in JSON input for table `{table}`");
            }
            let literal = reduced.literal(item, child_table)?;
            if !seen.insert(literal.as_str().to_string()) {
                bail_input!(
                    "Duplicate keys `{}` for table `{child_table}`",
                    literal.as_str()
                );
            }
        }
        return Ok(());
    }

    let mut seen: HashSet<Vec<String>> = HashSet::new();
    for item in items {
        if !item.is_object() {
            bail_input!("Invalid document in JSON input for table `{table}`");
        }
        object(tree, child, item, child_mode)?;
        if let Some(key) = explicit_key(child, item, child_table) {
            if !seen.insert(key.clone()) {
                bail_input!("Duplicate keys `{}` for table `{child_table}`", key.join(", "));
            }
        }
    }
    Ok(())
}

/// The element's fully explicit primary key, rendered, or `None` when
/// any key column is absent or null.
pub(super) fn explicit_key(child: &Object, item: &Value, child_table: &str) -> Option<Vec<String>> {
    let map = item.as_object()?;
    let mut key = vec![];
    for field in child.pk_fields() {
        let value = map.get(&field.name)?;
        if value.is_null() {
            return None;
        }
        let literal = field.literal(value, child_table).ok()?;
        key.push(literal.as_str().to_string());
    }
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

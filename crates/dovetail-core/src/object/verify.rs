use crate::object::{FieldSource, ObjectTree, SourceId};
use crate::Result;

/// Validates a freshly flattened tree and computes the foreign-key
/// direction of every join. Runs once, at the end of `build()`.
/// `referenced` lists the sources explicitly marked as referenced in the
/// builder.
pub(crate) fn finalize(tree: &mut ObjectTree, referenced: &[SourceId]) -> Result<()> {
    check(tree)?;
    compute_fk_direction(tree, referenced);
    Ok(())
}

fn check(tree: &ObjectTree) -> Result<()> {
    for object in tree.objects() {
        let table = tree.table_name(object.root_source);

        if object.fields.is_empty() {
            bail_config!("Object for table `{table}` has no fields");
        }

        for (ix, field) in object.fields.iter().enumerate() {
            if object.fields[..ix].iter().any(|f| f.name == field.name) {
                bail_config!("Duplicate field `{}` in table `{table}`", field.name);
            }
            if field.primary_key && field.source != object.root_source {
                bail_config!("Primary key field `{}` must come from table `{table}`", field.name);
            }
            if field.primary_key && field.disabled {
                bail_config!("Primary key field `{}` cannot be disabled", field.name);
            }
            if field.auto_increment && field.ty != crate::ColumnType::Integer {
                bail_config!("Field `{}` cannot auto increment: not an integer column", field.name);
            }
            if field.rev_uuid && field.ty != crate::ColumnType::Binary {
                bail_config!("Field `{}` cannot hold a generated UUID: not a binary column", field.name);
            }
        }

        if object.fields.iter().filter(|f| f.owner).count() > 1 {
            bail_config!("Table `{table}` maps more than one owner field");
        }

        let writable = tree.source(object.root_source).caps().writable();
        if writable && object.pk_fields().next().is_none() {
            bail_config!("Table `{table}` is writable but maps no primary key");
        }

        if let Some(joined) = tree.source(object.root_source).as_joined() {
            if let Some(target) = &joined.reduce_to_field {
                let found = object
                    .fields
                    .iter()
                    .any(|f| f.name == *target && !f.is_nested());
                if !found {
                    bail_config!("Reduce target `{target}` is not a field of table `{table}`");
                }
            }
        }
    }

    for object in tree.objects() {
        for id in joins_of(tree, object.id) {
            let joined = tree.joined(id);
            if joined.column_mapping.is_empty() {
                bail_config!("Join for table `{}` has no column mapping", joined.table);
            }
        }
    }

    Ok(())
}

/// The joined sources hanging off one object: its unnested to-one joins
/// plus the root sources of its child objects.
fn joins_of(tree: &ObjectTree, id: crate::object::ObjectId) -> Vec<SourceId> {
    let object = &tree[id];
    let mut joins = object.unnested_sources();
    joins.extend(
        tree.objects()
            .filter(|child| child.parent == Some(id))
            .map(|child| child.root_source),
    );
    joins
}

/// Marks each joined source with whether its rows carry the foreign key
/// to the parent row.
///
/// To-many joins always do. A to-one join is referenced (the parent row
/// carries the key) when marked so explicitly, or when its mapping's
/// local columns cover the joined object's mapped primary key, so that a
/// parent row identifies exactly one joined row. Otherwise the join
/// counts as owned when the mapping lands entirely on the parent's
/// mapped primary key.
fn compute_fk_direction(tree: &mut ObjectTree, referenced: &[SourceId]) {
    let mut updates: Vec<(SourceId, bool)> = vec![];

    for object in tree.objects() {
        let parent_pk: Vec<&str> = object
            .fields
            .iter()
            .filter(|f| f.primary_key && f.source == object.root_source)
            .map(|f| f.expect_column())
            .collect();

        for id in joins_of(tree, object.id) {
            let joined = tree.joined(id);
            let value = if joined.to_many {
                true
            } else if referenced.contains(&id) {
                false
            } else if covers_joined_pk(tree, id, &joined.column_mapping) {
                false
            } else {
                !parent_pk.is_empty()
                    && joined
                        .column_mapping
                        .iter()
                        .all(|(_, parent_col)| parent_pk.iter().any(|col| col == parent_col))
            };
            updates.push((id, value));
        }
    }

    for (id, references_parent) in updates {
        if let FieldSource::Joined(joined) = tree.source_mut(id) {
            joined.references_parent = references_parent;
        }
    }
}

fn covers_joined_pk(tree: &ObjectTree, id: SourceId, mapping: &[(String, String)]) -> bool {
    let Some(child) = tree.objects().find(|o| o.root_source == id) else {
        // Unnested sources map no primary key of their own.
        return false;
    };
    let pk: Vec<&str> = child
        .fields
        .iter()
        .filter(|f| f.primary_key)
        .map(|f| f.expect_column())
        .collect();
    !pk.is_empty()
        && pk
            .iter()
            .all(|col| mapping.iter().any(|(local, _)| local == col))
}

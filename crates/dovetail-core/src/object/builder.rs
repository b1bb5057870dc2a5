use crate::object::{
    verify, BaseTable, FieldSource, JoinedTable, ObjectField, ObjectId, ObjectTree, TableCaps,
};
use crate::value::ColumnType;
use crate::Result;

/// Builds an [`ObjectTree`], starting from [`ObjectTree::builder`].
///
/// Columns and joins are declared in the order their JSON keys should
/// appear in documents. Nested shapes use closures:
///
/// ```
/// use dovetail_core::{ColumnType, ObjectTree};
///
/// let tree = ObjectTree::builder("actorInfo", "sakila", "actor")
///     .caps(true, true, true)
///     .col("actorId", ColumnType::Integer, |c| {
///         c.column("actor_id").primary_key().auto_increment()
///     })
///     .col("firstName", ColumnType::String, |c| c.column("first_name"))
///     .join("filmActor", "sakila", "film_actor", |j| {
///         j.to_many()
///             .mapping("actor_id", "actor_id")
///             .caps(true, false, true)
///             .col("filmId", ColumnType::Integer, |c| c.column("film_id").primary_key())
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(tree.name(), "actorInfo");
/// ```
pub struct TreeBuilder {
    name: String,
    draft: ObjectDraft,
}

impl TreeBuilder {
    pub(crate) fn new(name: String, schema: String, table: String) -> Self {
        Self {
            name,
            draft: ObjectDraft::new(schema, table),
        }
    }

    /// Grants insert, update, and delete capabilities on the base table.
    pub fn caps(mut self, insert: bool, update: bool, delete: bool) -> Self {
        self.draft.caps.insert = insert;
        self.draft.caps.update = update;
        self.draft.caps.delete = delete;
        self
    }

    /// Table-level default for checksum participation.
    pub fn check(mut self, check: bool) -> Self {
        self.draft.caps.check = Some(check);
        self
    }

    pub fn col(
        mut self,
        name: impl Into<String>,
        ty: ColumnType,
        f: impl FnOnce(ColumnBuilder) -> ColumnBuilder,
    ) -> Self {
        self.draft.push_col(name.into(), ty, f);
        self
    }

    pub fn join(
        mut self,
        field_name: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
        f: impl FnOnce(JoinBuilder) -> JoinBuilder,
    ) -> Self {
        self.draft
            .push_join(field_name.into(), schema.into(), table.into(), f);
        self
    }

    pub fn build(self) -> Result<ObjectTree> {
        let mut tree = ObjectTree::new(self.name);
        let mut referenced = vec![];
        flatten(&mut tree, None, self.draft, None, &mut referenced)?;
        verify::finalize(&mut tree, &referenced)?;
        Ok(tree)
    }
}

/// Declares one mapped column.
pub struct ColumnBuilder {
    name: String,
    column: Option<String>,
    ty: ColumnType,
    nullable: bool,
    primary_key: bool,
    auto_increment: bool,
    rev_uuid: bool,
    owner: bool,
    disabled: bool,
    check: Option<bool>,
    no_update: bool,
    unique: bool,
    sortable: bool,
    no_filter: bool,
}

impl ColumnBuilder {
    fn new(name: String, ty: ColumnType) -> Self {
        Self {
            name,
            column: None,
            ty,
            nullable: true,
            primary_key: false,
            auto_increment: false,
            rev_uuid: false,
            owner: false,
            disabled: false,
            check: None,
            no_update: false,
            unique: false,
            sortable: false,
            no_filter: false,
        }
    }

    /// The database column name, when it differs from the JSON key.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self.sortable = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Generate a reversed UUIDv4 on insert.
    pub fn rev_uuid(mut self) -> Self {
        self.rev_uuid = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Fill from the caller identity instead of the document.
    pub fn owner(mut self) -> Self {
        self.owner = true;
        self
    }

    /// Exclude from documents entirely.
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Per-field checksum participation, overriding the table default.
    pub fn check(mut self, check: bool) -> Self {
        self.check = Some(check);
        self
    }

    /// Accept in input only when unchanged.
    pub fn no_update(mut self) -> Self {
        self.no_update = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn no_filter(mut self) -> Self {
        self.no_filter = true;
        self
    }

    fn into_field(self, source: crate::object::SourceId, name_override: Option<String>) -> ObjectField {
        let column = self.column.unwrap_or_else(|| self.name.clone());
        ObjectField {
            name: name_override.unwrap_or(self.name),
            column: Some(column),
            source,
            nested: None,
            ty: self.ty,
            nullable: self.nullable,
            primary_key: self.primary_key,
            auto_increment: self.auto_increment,
            rev_uuid: self.rev_uuid,
            owner: self.owner,
            disabled: self.disabled,
            check: self.check,
            no_update: self.no_update,
            unique: self.unique,
            sortable: self.sortable,
            no_filter: self.no_filter,
        }
    }
}

/// Declares one joined table, to-one by default.
pub struct JoinBuilder {
    spec: JoinSpec,
    draft: ObjectDraft,
}

struct JoinSpec {
    field_name: String,
    mapping: Vec<(String, String)>,
    to_many: bool,
    unnest: bool,
    referenced: bool,
    reduce_to: Option<String>,
}

impl JoinBuilder {
    fn new(field_name: String, schema: String, table: String) -> Self {
        Self {
            spec: JoinSpec {
                field_name,
                mapping: vec![],
                to_many: false,
                unnest: false,
                referenced: false,
                reduce_to: None,
            },
            draft: ObjectDraft::new(schema, table),
        }
    }

    /// Adds an equi-join pair: `local` on the joined table, `parent` on
    /// the parent's table.
    pub fn mapping(mut self, local: impl Into<String>, parent: impl Into<String>) -> Self {
        self.spec.mapping.push((local.into(), parent.into()));
        self
    }

    pub fn to_many(mut self) -> Self {
        self.spec.to_many = true;
        self
    }

    /// Splice this table's columns into the parent object.
    pub fn unnest(mut self) -> Self {
        self.spec.unnest = true;
        self
    }

    /// Marks this to-one join as referenced: the parent's table carries
    /// the foreign key, so rows here are looked up rather than owned.
    /// Usually inferred from the column mapping; set it explicitly when
    /// the mapping lands on parent columns that double as key members,
    /// as under a junction table.
    pub fn referenced(mut self) -> Self {
        self.spec.referenced = true;
        self
    }

    /// Collapse the mapped rows to the named field's values.
    pub fn reduce_to(mut self, field: impl Into<String>) -> Self {
        self.spec.reduce_to = Some(field.into());
        self
    }

    pub fn caps(mut self, insert: bool, update: bool, delete: bool) -> Self {
        self.draft.caps.insert = insert;
        self.draft.caps.update = update;
        self.draft.caps.delete = delete;
        self
    }

    /// Table-level default for checksum participation.
    pub fn check(mut self, check: bool) -> Self {
        self.draft.caps.check = Some(check);
        self
    }

    pub fn col(
        mut self,
        name: impl Into<String>,
        ty: ColumnType,
        f: impl FnOnce(ColumnBuilder) -> ColumnBuilder,
    ) -> Self {
        self.draft.push_col(name.into(), ty, f);
        self
    }

    pub fn join(
        mut self,
        field_name: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
        f: impl FnOnce(JoinBuilder) -> JoinBuilder,
    ) -> Self {
        self.draft
            .push_join(field_name.into(), schema.into(), table.into(), f);
        self
    }
}

struct ObjectDraft {
    schema: String,
    table: String,
    caps: TableCaps,
    entries: Vec<Entry>,
}

enum Entry {
    Col(ColumnBuilder),
    Join(JoinSpec, ObjectDraft),
}

impl ObjectDraft {
    fn new(schema: String, table: String) -> Self {
        Self {
            schema,
            table,
            caps: TableCaps::default(),
            entries: vec![],
        }
    }

    fn push_col(&mut self, name: String, ty: ColumnType, f: impl FnOnce(ColumnBuilder) -> ColumnBuilder) {
        self.entries.push(Entry::Col(f(ColumnBuilder::new(name, ty))));
    }

    fn push_join(
        &mut self,
        field_name: String,
        schema: String,
        table: String,
        f: impl FnOnce(JoinBuilder) -> JoinBuilder,
    ) {
        let built = f(JoinBuilder::new(field_name, schema, table));
        self.entries.push(Entry::Join(built.spec, built.draft));
    }
}

/// Moves a draft into the arena, depth-first in declaration order, and
/// returns the new object's id. Sources explicitly marked as referenced
/// are recorded in `referenced` for the verify pass.
fn flatten(
    tree: &mut ObjectTree,
    join: Option<JoinSpec>,
    draft: ObjectDraft,
    parent: Option<ObjectId>,
    referenced: &mut Vec<crate::object::SourceId>,
) -> Result<ObjectId> {
    let ObjectDraft {
        schema,
        table,
        caps,
        entries,
    } = draft;

    let source = match join {
        None => FieldSource::Base(BaseTable {
            schema,
            table,
            caps,
        }),
        Some(spec) => FieldSource::Joined(JoinedTable {
            schema,
            table,
            column_mapping: spec.mapping,
            to_many: spec.to_many,
            unnest: spec.unnest,
            caps,
            reduce_to_field: spec.reduce_to,
            references_parent: false,
        }),
    };
    let source_id = tree.push_source(source);
    let object_id = tree.push_object(parent, source_id);

    for entry in entries {
        match entry {
            Entry::Col(col) => {
                let field = col.into_field(source_id, None);
                tree.object_mut(object_id).fields.push(field);
            }
            Entry::Join(spec, child) if spec.unnest && !spec.to_many => {
                flatten_unnested(tree, object_id, spec, child, referenced)?;
            }
            Entry::Join(spec, child) => {
                if spec.unnest {
                    bail_config!("Cannot unnest the to-many join for table `{}`", child.table);
                }
                if spec.referenced && spec.to_many {
                    bail_config!(
                        "Cannot mark the to-many join for table `{}` as referenced",
                        child.table
                    );
                }
                let field_name = spec.field_name.clone();
                let explicit = spec.referenced;
                let child_id = flatten(tree, Some(spec), child, Some(object_id), referenced)?;
                let child_root = tree[child_id].root_source;
                if explicit {
                    referenced.push(child_root);
                }
                tree.object_mut(object_id).fields.push(ObjectField {
                    name: field_name,
                    column: None,
                    source: child_root,
                    nested: Some(child_id),
                    ty: ColumnType::Json,
                    nullable: true,
                    primary_key: false,
                    auto_increment: false,
                    rev_uuid: false,
                    owner: false,
                    disabled: false,
                    check: None,
                    no_update: false,
                    unique: false,
                    sortable: false,
                    no_filter: false,
                });
            }
        }
    }

    Ok(object_id)
}

/// Splices an unnested to-one join's columns into `object_id`. With a
/// reduce target the join contributes a single field carrying the join's
/// own name.
fn flatten_unnested(
    tree: &mut ObjectTree,
    object_id: ObjectId,
    spec: JoinSpec,
    child: ObjectDraft,
    referenced: &mut Vec<crate::object::SourceId>,
) -> Result<()> {
    let table = child.table.clone();
    let reduce = spec.reduce_to.clone();
    let source_id = tree.push_source(FieldSource::Joined(JoinedTable {
        schema: child.schema,
        table: child.table,
        column_mapping: spec.mapping,
        to_many: false,
        unnest: true,
        caps: child.caps,
        reduce_to_field: spec.reduce_to,
        references_parent: false,
    }));
    if spec.referenced {
        referenced.push(source_id);
    }

    if let Some(target) = reduce {
        let mut entries = child.entries;
        let col = match entries.pop() {
            Some(Entry::Col(col)) if entries.is_empty() && col.name == target => col,
            _ => bail_config!(
                "Reduced join for table `{table}` must declare the reduced field `{target}` and nothing else"
            ),
        };
        let field = col.into_field(source_id, Some(spec.field_name));
        tree.object_mut(object_id).fields.push(field);
        return Ok(());
    }

    for entry in child.entries {
        match entry {
            Entry::Col(col) => {
                let field = col.into_field(source_id, None);
                tree.object_mut(object_id).fields.push(field);
            }
            Entry::Join(..) => {
                bail_config!("Cannot nest a join under the unnested table `{table}`")
            }
        }
    }
    Ok(())
}

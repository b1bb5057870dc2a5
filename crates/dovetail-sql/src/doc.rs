pub(crate) mod encode;

use crate::fmt::{Formatter, Ident, TableRef, ToSql};
use encode::{value_expr, Qual};

use dovetail_core::{
    bail_config, bail_input, FieldFilter, FilterView, Object, ObjectTree, PrimaryKeyColumnValues,
    Result, RowOwnership, SourceId, SqlLiteral,
};

use std::collections::HashMap;

/// Generates extra WHERE conditions for the root table of a document
/// read, given the root table's alias.
pub trait RowFilter {
    /// The predicate body, without the `WHERE` keyword. `None` adds
    /// nothing.
    fn render(&self, root_alias: &str) -> Option<String>;
}

/// Builds the document SELECT for a tree: one result row per root row,
/// column `doc` carrying the row's JSON document.
///
/// When an ETag is requested while a field filter is active, a second
/// column `check_doc` carries the unfiltered document, so checksums stay
/// independent of the projection.
pub struct DocSelect<'a> {
    tree: &'a ObjectTree,
    filter: Option<&'a FieldFilter>,
    ownership: Option<&'a RowOwnership>,
    row_filter: Option<&'a dyn RowFilter>,
    big_ints_as_strings: bool,
    etag: bool,
    sort: Vec<(String, bool)>,
    target: Target<'a>,
}

enum Target<'a> {
    Page { limit: u64, offset: u64 },
    All,
    One(&'a PrimaryKeyColumnValues),
}

impl<'a> DocSelect<'a> {
    /// A page of root rows. The statement asks for one row beyond
    /// `limit` so the executor can tell whether more follow.
    pub fn page(tree: &'a ObjectTree, limit: u64, offset: u64) -> Self {
        Self::new(tree, Target::Page { limit, offset })
    }

    /// Every matching root row, unpaged.
    pub fn all(tree: &'a ObjectTree) -> Self {
        Self::new(tree, Target::All)
    }

    /// The single root row with the given primary key.
    pub fn one(tree: &'a ObjectTree, key: &'a PrimaryKeyColumnValues) -> Self {
        Self::new(tree, Target::One(key))
    }

    fn new(tree: &'a ObjectTree, target: Target<'a>) -> Self {
        Self {
            tree,
            filter: None,
            ownership: None,
            row_filter: None,
            big_ints_as_strings: false,
            etag: false,
            sort: vec![],
            target,
        }
    }

    pub fn filter(mut self, filter: &'a FieldFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn ownership(mut self, ownership: Option<&'a RowOwnership>) -> Self {
        self.ownership = ownership;
        self
    }

    pub fn row_filter(mut self, row_filter: &'a dyn RowFilter) -> Self {
        self.row_filter = Some(row_filter);
        self
    }

    /// Render 64-bit integer columns as JSON strings.
    pub fn big_ints_as_strings(mut self, enabled: bool) -> Self {
        self.big_ints_as_strings = enabled;
        self
    }

    /// Ask for the document column a checksum can be computed from.
    pub fn etag(mut self, enabled: bool) -> Self {
        self.etag = enabled;
        self
    }

    /// Order the page by a root field. Root primary-key columns are
    /// always appended, keeping pagination stable.
    pub fn sort(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.sort.push((field.into(), descending));
        self
    }

    /// Whether the rendered statement carries the second, unfiltered
    /// document column.
    pub fn has_check_column(&self) -> bool {
        self.etag && self.filter.is_some_and(|f| !f.is_empty())
    }

    pub fn render(&self) -> Result<String> {
        let mut dst = String::new();
        let f = &mut Formatter { dst: &mut dst };
        let mut aliases = Aliases::default();
        let root = self.tree.root();
        assign_aliases(&mut aliases, root);

        let view = match self.filter {
            Some(filter) => filter.root(),
            None => FilterView::all(),
        };

        fmt!(f, "SELECT ");
        object_expr(f, &mut aliases, self.tree, root, view, self.big_ints_as_strings)?;
        fmt!(f, " AS doc");
        if self.has_check_column() {
            fmt!(f, ", ");
            object_expr(
                f,
                &mut aliases,
                self.tree,
                root,
                FilterView::all(),
                self.big_ints_as_strings,
            )?;
            fmt!(f, " AS check_doc");
        }

        fmt!(f, " FROM ");
        push_from(f, &aliases, self.tree, root);

        let mut sep = " WHERE ";
        if let Target::One(key) = &self.target {
            if root.pk_fields().next().is_none() {
                bail_config!(
                    "Table `{}` maps no primary key",
                    self.tree.table_name(root.root_source)
                );
            }
            for field in root.pk_fields() {
                let column = field.expect_column();
                let Some(value) = key.get(column) else {
                    bail_input!("ID `{column}` missing");
                };
                fmt!(f, sep aliases.get(root.root_source) "." Ident(column) " = " value);
                sep = " AND ";
            }
        }
        if let Some(ownership) = self.ownership {
            if let Some(field) = root.owner_field() {
                let alias = aliases.get(field.source);
                fmt!(f, sep alias "." Ident(field.expect_column()) " = " ownership.user_id());
                sep = " AND ";
            }
        }
        if let Some(row_filter) = self.row_filter {
            if let Some(pred) = row_filter.render(aliases.get(root.root_source)) {
                fmt!(f, sep "(" pred ")");
            }
        }

        if let Target::Page { .. } = self.target {
            let mut sep = " ORDER BY ";
            let mut ordered: Vec<&str> = vec![];
            for (name, descending) in &self.sort {
                let Some(field) = root.field(name) else {
                    bail_input!("Unknown field `{name}` in sort");
                };
                if field.is_nested() || !field.sortable {
                    bail_input!("Cannot sort by field `{name}`");
                }
                let column = field.expect_column();
                fmt!(f, sep aliases.get(field.source) "." Ident(column));
                if *descending {
                    fmt!(f, " DESC");
                }
                sep = ", ";
                ordered.push(column);
            }
            for field in root.pk_fields() {
                let column = field.expect_column();
                if ordered.contains(&column) {
                    continue;
                }
                fmt!(f, sep aliases.get(field.source) "." Ident(column));
                sep = ", ";
            }
        }

        if let Target::Page { limit, offset } = self.target {
            fmt!(f, " LIMIT " limit.saturating_add(1) " OFFSET " offset);
        }

        dst.push(';');
        Ok(dst)
    }
}

/// Table aliases for one traversal, `t0`, `t1`, … in order of first
/// appearance. Rendering the same tree twice numbers identically.
#[derive(Default)]
struct Aliases {
    next: usize,
    map: HashMap<SourceId, String>,
}

impl Aliases {
    fn assign(&mut self, id: SourceId) -> &str {
        if !self.map.contains_key(&id) {
            let alias = format!("t{}", self.next);
            self.next += 1;
            self.map.insert(id, alias);
        }
        &self.map[&id]
    }

    /// A fresh alias not tied to a source, for derived-table wrappers.
    fn anon(&mut self) -> String {
        let alias = format!("t{}", self.next);
        self.next += 1;
        alias
    }

    fn get(&self, id: SourceId) -> &str {
        &self.map[&id]
    }
}

fn assign_aliases(aliases: &mut Aliases, object: &Object) {
    aliases.assign(object.root_source);
    for id in object.unnested_sources() {
        aliases.assign(id);
    }
}

/// `JSON_OBJECT('name', <value>, …)` for one object, honoring the filter
/// view. Nested fields recurse into correlated subqueries.
fn object_expr(
    f: &mut Formatter<'_>,
    aliases: &mut Aliases,
    tree: &ObjectTree,
    object: &Object,
    view: FilterView<'_>,
    big_ints: bool,
) -> Result<()> {
    fmt!(f, "JSON_OBJECT(");
    let mut s = "";
    for field in &object.fields {
        if field.disabled || !view.allows(&field.name) {
            continue;
        }
        let key = SqlLiteral::quoted(&field.name);
        fmt!(f, s key ", ");
        s = ", ";
        match field.nested {
            Some(child_id) => {
                let child = &tree[child_id];
                if tree.joined(child.root_source).to_many {
                    array_expr(f, aliases, tree, object, child, view.descend(&field.name), big_ints)?;
                } else {
                    one_expr(f, aliases, tree, object, child, view.descend(&field.name), big_ints)?;
                }
            }
            None => {
                let q = Qual {
                    alias: aliases.get(field.source),
                    column: field.expect_column(),
                };
                value_expr(f, q, field.ty, big_ints);
            }
        }
    }
    fmt!(f, ")");
    Ok(())
}

/// A to-one nested object: a correlated scalar subquery limited to one
/// row, `null` when no row matches.
fn one_expr(
    f: &mut Formatter<'_>,
    aliases: &mut Aliases,
    tree: &ObjectTree,
    parent: &Object,
    child: &Object,
    view: FilterView<'_>,
    big_ints: bool,
) -> Result<()> {
    assign_aliases(aliases, child);
    fmt!(f, "(SELECT ");
    object_expr(f, aliases, tree, child, view, big_ints)?;
    fmt!(f, " FROM ");
    push_from(f, aliases, tree, child);
    correlation(f, aliases, tree, parent, child.root_source);
    fmt!(f, " LIMIT 1)");
    Ok(())
}

/// A to-many nested array: `JSON_ARRAYAGG` over an ordered derived
/// table, `[]` when no row matches. Reduced joins aggregate the scalar
/// instead of per-row objects.
fn array_expr(
    f: &mut Formatter<'_>,
    aliases: &mut Aliases,
    tree: &ObjectTree,
    parent: &Object,
    child: &Object,
    view: FilterView<'_>,
    big_ints: bool,
) -> Result<()> {
    let wrapper = aliases.anon();
    assign_aliases(aliases, child);
    let reduce = tree.joined(child.root_source).reduce_to_field.clone();

    if let Some(target) = reduce {
        let field = child
            .fields
            .iter()
            .find(|field| field.name == target)
            .expect("verified reduce target");
        fmt!(f, "(SELECT COALESCE(JSON_ARRAYAGG(" wrapper ".v), JSON_ARRAY()) FROM (SELECT ");
        let q = Qual {
            alias: aliases.get(field.source),
            column: field.expect_column(),
        };
        value_expr(f, q, field.ty, big_ints);
        fmt!(f, " AS v FROM ");
        push_from(f, aliases, tree, child);
        correlation(f, aliases, tree, parent, child.root_source);
        order_rows(f, aliases, child, true);
        fmt!(f, ") AS " wrapper ")");
    } else {
        fmt!(f, "(SELECT COALESCE(JSON_ARRAYAGG(" wrapper ".doc), JSON_ARRAY()) FROM (SELECT ");
        object_expr(f, aliases, tree, child, view, big_ints)?;
        fmt!(f, " AS doc FROM ");
        push_from(f, aliases, tree, child);
        correlation(f, aliases, tree, parent, child.root_source);
        order_rows(f, aliases, child, false);
        fmt!(f, ") AS " wrapper ")");
    }
    Ok(())
}

/// `schema.table AS alias`, plus LEFT JOINs for the object's unnested
/// sources.
fn push_from(f: &mut Formatter<'_>, aliases: &Aliases, tree: &ObjectTree, object: &Object) {
    let source = tree.source(object.root_source);
    let table = TableRef {
        schema: source.schema(),
        table: source.table(),
    };
    fmt!(f, table " AS " aliases.get(object.root_source));

    for id in object.unnested_sources() {
        let joined = tree.joined(id);
        let table = TableRef {
            schema: &joined.schema,
            table: &joined.table,
        };
        fmt!(f, " LEFT JOIN " table " AS " aliases.get(id) " ON ");
        let mut s = "";
        for (local, parent_col) in &joined.column_mapping {
            fmt!(f, s aliases.get(id) "." Ident(local) " = "
                aliases.get(object.root_source) "." Ident(parent_col));
            s = " AND ";
        }
    }
}

/// The WHERE tying a child subquery to its parent row.
fn correlation(
    f: &mut Formatter<'_>,
    aliases: &Aliases,
    tree: &ObjectTree,
    parent: &Object,
    child_source: SourceId,
) {
    let joined = tree.joined(child_source);
    let mut s = " WHERE ";
    for (local, parent_col) in &joined.column_mapping {
        fmt!(f, s aliases.get(child_source) "." Ident(local) " = "
            aliases.get(parent.root_source) "." Ident(parent_col));
        s = " AND ";
    }
}

/// Deterministic element order inside arrays: the child's primary key,
/// or the aggregated value itself for reduced joins without one.
fn order_rows(f: &mut Formatter<'_>, aliases: &Aliases, child: &Object, value_fallback: bool) {
    let mut s = " ORDER BY ";
    for field in child.pk_fields() {
        fmt!(f, s aliases.get(field.source) "." Ident(field.expect_column()));
        s = ", ";
    }
    if s == " ORDER BY " && value_fallback {
        fmt!(f, " ORDER BY v");
    }
}

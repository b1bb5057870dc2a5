use crate::doc::encode::value_expr;
use crate::fmt::{self, Comma, Formatter, Ident, TableRef, ToSql};

use dovetail_core::{ObjectField, SqlLiteral};

/// AND-joined column equalities, the WHERE body of single-table
/// statements. `NULL` values render as `IS NULL`.
#[derive(Debug, Clone, Default)]
pub struct Conjunction {
    terms: Vec<(String, SqlLiteral)>,
}

impl Conjunction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: SqlLiteral) {
        self.terms.push((column.into(), value));
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl ToSql for &Conjunction {
    fn to_sql(self, f: &mut Formatter<'_>) {
        let mut s = "";
        for (column, value) in &self.terms {
            if value.is_null() {
                fmt!(f, s Ident(column) " IS NULL");
            } else {
                fmt!(f, s Ident(column) " = " value);
            }
            s = " AND ";
        }
    }
}

/// `INSERT INTO schema.table (columns) VALUES (literals)`.
#[derive(Debug, Clone)]
pub struct Insert {
    schema: String,
    table: String,
    columns: Vec<String>,
    values: Vec<SqlLiteral>,
}

impl Insert {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            columns: vec![],
            values: vec![],
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: SqlLiteral) {
        self.columns.push(column.into());
        self.values.push(value);
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn render(&self) -> String {
        fmt::to_string(self)
    }
}

impl ToSql for &Insert {
    fn to_sql(self, f: &mut Formatter<'_>) {
        let table = TableRef {
            schema: &self.schema,
            table: &self.table,
        };
        let columns = Comma(self.columns.iter().map(Ident));
        let values = Comma(&self.values);
        fmt!(f, "INSERT INTO " table " (" columns ") VALUES (" values ")");
    }
}

/// `UPDATE schema.table SET assignments WHERE filter`.
#[derive(Debug, Clone)]
pub struct Update {
    schema: String,
    table: String,
    assignments: Vec<(String, SqlLiteral)>,
    pub filter: Conjunction,
}

impl Update {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            assignments: vec![],
            filter: Conjunction::new(),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: SqlLiteral) {
        self.assignments.push((column.into(), value));
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn render(&self) -> String {
        fmt::to_string(self)
    }
}

impl ToSql for &Update {
    fn to_sql(self, f: &mut Formatter<'_>) {
        let table = TableRef {
            schema: &self.schema,
            table: &self.table,
        };
        fmt!(f, "UPDATE " table " SET ");
        let mut s = "";
        for (column, value) in &self.assignments {
            fmt!(f, s Ident(column) " = " value);
            s = ", ";
        }
        if !self.filter.is_empty() {
            fmt!(f, " WHERE " self.filter);
        }
    }
}

/// `DELETE FROM schema.table WHERE filter`.
#[derive(Debug, Clone)]
pub struct Delete {
    schema: String,
    table: String,
    pub filter: Conjunction,
}

impl Delete {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            filter: Conjunction::new(),
        }
    }

    pub fn render(&self) -> String {
        fmt::to_string(self)
    }
}

impl ToSql for &Delete {
    fn to_sql(self, f: &mut Formatter<'_>) {
        let table = TableRef {
            schema: &self.schema,
            table: &self.table,
        };
        fmt!(f, "DELETE FROM " table);
        if !self.filter.is_empty() {
            fmt!(f, " WHERE " self.filter);
        }
    }
}

/// `SELECT columns FROM schema.table WHERE filter`, for key lookups and
/// existence checks on one table.
#[derive(Debug, Clone)]
pub struct RowSelect {
    schema: String,
    table: String,
    columns: Vec<SelectColumn>,
    pub filter: Conjunction,
}

#[derive(Debug, Clone)]
enum SelectColumn {
    Name(String),
    Expr(String),
}

impl RowSelect {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            columns: vec![],
            filter: Conjunction::new(),
        }
    }

    pub fn push_column(&mut self, column: impl Into<String>) {
        self.columns.push(SelectColumn::Name(column.into()));
    }

    /// Selects the field's column through its JSON-producing encoding, so
    /// result text compares against document values directly.
    pub fn push_field(&mut self, field: &ObjectField) {
        let mut expr = String::new();
        let f = &mut Formatter { dst: &mut expr };
        value_expr(f, Ident(field.expect_column()), field.ty, false);
        self.columns.push(SelectColumn::Expr(expr));
    }

    pub fn render(&self) -> String {
        fmt::to_string(self)
    }
}

impl ToSql for &SelectColumn {
    fn to_sql(self, f: &mut Formatter<'_>) {
        match self {
            SelectColumn::Name(name) => fmt!(f, Ident(name)),
            SelectColumn::Expr(expr) => fmt!(f, expr.as_str()),
        }
    }
}

impl ToSql for &RowSelect {
    fn to_sql(self, f: &mut Formatter<'_>) {
        let table = TableRef {
            schema: &self.schema,
            table: &self.table,
        };
        let columns = Comma(&self.columns);
        fmt!(f, "SELECT " columns " FROM " table);
        if !self.filter.is_empty() {
            fmt!(f, " WHERE " self.filter);
        }
    }
}

use super::{Formatter, ToSql};

/// A backtick-quoted identifier.
#[derive(Clone, Copy)]
pub(crate) struct Ident<S>(pub(crate) S);

impl<S: AsRef<str>> ToSql for Ident<S> {
    fn to_sql(self, f: &mut Formatter<'_>) {
        f.dst.push('`');
        for ch in self.0.as_ref().chars() {
            if ch == '`' {
                f.dst.push('`');
            }
            f.dst.push(ch);
        }
        f.dst.push('`');
    }
}

/// A schema-qualified table reference.
pub(crate) struct TableRef<'a> {
    pub(crate) schema: &'a str,
    pub(crate) table: &'a str,
}

impl ToSql for TableRef<'_> {
    fn to_sql(self, f: &mut Formatter<'_>) {
        fmt!(f, Ident(self.schema) "." Ident(self.table));
    }
}

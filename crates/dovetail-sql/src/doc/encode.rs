use crate::fmt::{Formatter, ToSql};

use dovetail_core::ColumnType;

/// `alias.`column``
#[derive(Clone, Copy)]
pub(crate) struct Qual<'a> {
    pub(crate) alias: &'a str,
    pub(crate) column: &'a str,
}

impl ToSql for Qual<'_> {
    fn to_sql(self, f: &mut Formatter<'_>) {
        fmt!(f, self.alias "." crate::fmt::Ident(self.column));
    }
}

/// The JSON-producing expression for one scalar column.
///
/// `JSON_OBJECT` turns SQL NULL into JSON null on its own; only booleans
/// need the explicit branch, since their storage is numeric.
pub(crate) fn value_expr<Q>(f: &mut Formatter<'_>, q: Q, ty: ColumnType, big_ints: bool)
where
    Q: ToSql + Copy,
{
    match ty {
        ColumnType::Binary => fmt!(f, "TO_BASE64(" q ")"),
        ColumnType::Geometry => fmt!(f, "CAST(ST_AsGeoJSON(" q ") AS JSON)"),
        ColumnType::Boolean => fmt!(
            f,
            "IF(" q " IS NULL, NULL, IF(" q " = 0, CAST('false' AS JSON), CAST('true' AS JSON)))"
        ),
        ColumnType::Integer if big_ints => fmt!(f, "CAST(" q " AS CHAR)"),
        _ => fmt!(f, q),
    }
}

macro_rules! fmt {
    ($f:expr, $( $fragments:expr )*) => {{
        $(
            $fragments.to_sql($f);
        )*
    }};
}

mod delim;
mod ident;

pub(crate) use delim::Comma;
pub(crate) use ident::{Ident, TableRef};

use dovetail_core::SqlLiteral;

pub(crate) struct Formatter<'a> {
    pub(crate) dst: &'a mut String,
}

pub(crate) trait ToSql {
    fn to_sql(self, f: &mut Formatter<'_>);
}

impl ToSql for &str {
    fn to_sql(self, f: &mut Formatter<'_>) {
        f.dst.push_str(self);
    }
}

impl ToSql for &String {
    fn to_sql(self, f: &mut Formatter<'_>) {
        f.dst.push_str(self);
    }
}

impl ToSql for &SqlLiteral {
    fn to_sql(self, f: &mut Formatter<'_>) {
        f.dst.push_str(self.as_str());
    }
}

impl ToSql for u64 {
    fn to_sql(self, f: &mut Formatter<'_>) {
        f.dst.push_str(&self.to_string());
    }
}

/// Renders one fragment to a complete statement string.
pub(crate) fn to_string(fragment: impl ToSql) -> String {
    let mut dst = String::new();
    let mut f = Formatter { dst: &mut dst };
    fragment.to_sql(&mut f);
    dst.push(';');
    dst
}

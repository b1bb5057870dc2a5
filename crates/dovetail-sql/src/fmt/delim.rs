use super::{Formatter, ToSql};

/// Comma delimited
pub(crate) struct Comma<L>(pub(crate) L);

impl<L> ToSql for Comma<L>
where
    L: IntoIterator,
    L::Item: ToSql,
{
    fn to_sql(self, f: &mut Formatter<'_>) {
        let mut s = "";
        for i in self.0 {
            fmt!(f, s i);
            s = ", ";
        }
    }
}

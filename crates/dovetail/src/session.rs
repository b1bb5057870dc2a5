use dovetail_core::{Result, SqlLiteral};

/// A synchronous database connection the engine runs its statements on.
///
/// The engine never opens, closes, or pools sessions; it issues complete
/// statements and reads rows back in the text protocol, one
/// `Option<String>` per column with `None` for SQL NULL.
pub trait Session {
    /// Run a statement that returns no rows. Returns the number of
    /// affected rows.
    fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Run a query, invoking `on_row` once per result row.
    fn query(
        &mut self,
        sql: &str,
        on_row: &mut dyn FnMut(&[Option<String>]) -> Result<()>,
    ) -> Result<()>;

    /// Run a query expected to return at most one row.
    fn query_one(&mut self, sql: &str) -> Result<Option<Vec<Option<String>>>> {
        let mut first = None;
        self.query(sql, &mut |row| {
            if first.is_none() {
                first = Some(row.to_vec());
            }
            Ok(())
        })?;
        Ok(first)
    }

    /// The auto-increment value assigned by the most recent INSERT on
    /// this session.
    fn last_insert_id(&mut self) -> Result<u64>;

    /// Quote a string for inclusion in a statement.
    fn quote(&self, text: &str) -> SqlLiteral {
        SqlLiteral::quoted(text)
    }
}

//! Test doubles for the [`Session`] trait.

use crate::Session;
use dovetail_core::Result;

use std::collections::VecDeque;

/// A [`Session`] that replays a scripted exchange: each call must match
/// the next expected statement and yields its canned response. A call
/// that deviates from the script panics with the offending SQL.
pub struct ScriptedSession {
    steps: VecDeque<Step>,
    last_insert_id: u64,
}

enum Step {
    Execute {
        sql: String,
        affected: u64,
        insert_id: Option<u64>,
    },
    Query {
        sql: String,
        rows: Vec<Vec<Option<String>>>,
    },
}

impl Step {
    fn sql(&self) -> &str {
        match self {
            Step::Execute { sql, .. } => sql,
            Step::Query { sql, .. } => sql,
        }
    }
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self {
            steps: VecDeque::new(),
            last_insert_id: 0,
        }
    }

    /// Expect `execute` with exactly `sql`, reporting `affected` rows.
    pub fn expect_execute(mut self, sql: impl Into<String>, affected: u64) -> Self {
        self.steps.push_back(Step::Execute {
            sql: sql.into(),
            affected,
            insert_id: None,
        });
        self
    }

    /// Expect an INSERT, recording `insert_id` as the session's next
    /// `last_insert_id` answer.
    pub fn expect_insert(mut self, sql: impl Into<String>, insert_id: u64) -> Self {
        self.steps.push_back(Step::Execute {
            sql: sql.into(),
            affected: 1,
            insert_id: Some(insert_id),
        });
        self
    }

    /// Expect `query` with exactly `sql`, yielding `rows`.
    pub fn expect_query(
        mut self,
        sql: impl Into<String>,
        rows: Vec<Vec<Option<String>>>,
    ) -> Self {
        self.steps.push_back(Step::Query {
            sql: sql.into(),
            rows,
        });
        self
    }

    /// Panics if scripted statements were never reached.
    pub fn finish(self) {
        if let Some(step) = self.steps.front() {
            panic!("script not fully consumed, next expected: {}", step.sql());
        }
    }

    fn next(&mut self, sql: &str) -> Step {
        match self.steps.pop_front() {
            Some(step) => step,
            None => panic!("statement past the end of the script: {sql}"),
        }
    }
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Session for ScriptedSession {
    fn execute(&mut self, sql: &str) -> Result<u64> {
        match self.next(sql) {
            Step::Execute {
                sql: expected,
                affected,
                insert_id,
            } => {
                assert_eq!(sql, expected, "execute deviates from the script");
                if let Some(id) = insert_id {
                    self.last_insert_id = id;
                }
                Ok(affected)
            }
            Step::Query { sql: expected, .. } => {
                panic!("script expected query `{expected}`, got execute `{sql}`")
            }
        }
    }

    fn query(
        &mut self,
        sql: &str,
        on_row: &mut dyn FnMut(&[Option<String>]) -> Result<()>,
    ) -> Result<()> {
        match self.next(sql) {
            Step::Query {
                sql: expected,
                rows,
            } => {
                assert_eq!(sql, expected, "query deviates from the script");
                for row in rows {
                    on_row(&row)?;
                }
                Ok(())
            }
            Step::Execute { sql: expected, .. } => {
                panic!("script expected execute `{expected}`, got query `{sql}`")
            }
        }
    }

    fn last_insert_id(&mut self) -> Result<u64> {
        Ok(self.last_insert_id)
    }
}

/// One all-text result row.
pub fn row<I>(cells: I) -> Vec<Option<String>>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    cells.into_iter().map(|cell| Some(cell.into())).collect()
}

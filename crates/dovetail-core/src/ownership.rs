use crate::value::SqlLiteral;

/// The caller identity used for row-level ownership.
///
/// When a tree maps an owner field, reads only see rows whose owner
/// column equals this identity, updates and deletes only touch them, and
/// inserts stamp the column with it. Document input for an owner field is
/// ignored in favor of this value.
#[derive(Debug, Clone, PartialEq)]
pub struct RowOwnership {
    user_id: SqlLiteral,
}

impl RowOwnership {
    /// An identity stored in a binary column, as raw bytes.
    pub fn binary(id: &[u8]) -> Self {
        Self {
            user_id: SqlLiteral::bytes(id),
        }
    }

    pub fn text(id: &str) -> Self {
        Self {
            user_id: SqlLiteral::quoted(id),
        }
    }

    pub fn integer(id: i64) -> Self {
        Self {
            user_id: SqlLiteral::from(id),
        }
    }

    pub fn from_literal(user_id: SqlLiteral) -> Self {
        Self { user_id }
    }

    /// The identity as a ready-to-embed SQL literal.
    pub fn user_id(&self) -> &SqlLiteral {
        &self.user_id
    }
}

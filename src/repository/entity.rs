use std::fmt::Display;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Postgres};

use crate::query::conditions::format_value;

/// A persisted domain record mapped to one relational table.
///
/// The constants hand the generic repository its identifiers at compile
/// time, so no runtime reflection is involved and no user input ever reaches
/// an identifier position in generated SQL.
pub trait Entity:
    for<'r> FromRow<'r, PgRow> + Serialize + DeserializeOwned + Send + Sync + Unpin + 'static
{
    const TABLE: &'static str;
    const ID_COLUMN: &'static str = "id";

    type Id: Clone
        + Display
        + PartialEq
        + Send
        + Sync
        + for<'q> sqlx::Encode<'q, Postgres>
        + sqlx::Type<Postgres>;

    fn id(&self) -> &Self::Id;

    /// The id rendered as a SQL-literal value, for `IN` lists.
    fn id_value(id: &Self::Id) -> serde_json::Value {
        serde_json::Value::String(id.to_string())
    }
}

/// Entities deleted by timestamp marker instead of row removal.
pub trait SoftDeletable: Entity {
    const DELETED_AT_COLUMN: &'static str = "deleted_at";
}

/// Entities carrying a version counter for optimistic locking.
pub trait Versioned: Entity {
    const VERSION_COLUMN: &'static str = "version";

    fn version(&self) -> i32;
}

/// Insert payload for one entity type. `columns` and `values` must align
/// index-for-index.
pub trait NewEntity: Send + Sync {
    type Entity: Entity;

    fn columns(&self) -> Vec<&'static str>;
    fn values(&self) -> Vec<serde_json::Value>;
}

/// Right-hand side of one column assignment.
#[derive(Debug, Clone)]
enum Assignment {
    /// A value rendered as an escaped SQL literal.
    Value(serde_json::Value),
    /// A SQL expression embedded verbatim (`NOW()`, `counter + 1`).
    Raw(String),
}

impl Assignment {
    fn to_sql(&self) -> String {
        match self {
            Assignment::Value(value) => format_value(value),
            Assignment::Raw(expression) => expression.clone(),
        }
    }
}

/// Dynamic update payload: an ordered set of column assignments.
///
/// Columns are supplied by repository code as string constants; values are
/// rendered as escaped SQL literals, the same way the condition types render
/// theirs.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    entries: Vec<(String, Assignment)>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: &str, value: serde_json::Value) -> Self {
        self.entries
            .push((column.to_string(), Assignment::Value(value)));
        self
    }

    /// Raw SQL on the right-hand side, embedded verbatim.
    pub fn set_raw(mut self, column: &str, expression: &str) -> Self {
        self.entries
            .push((column.to_string(), Assignment::Raw(expression.to_string())));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn columns(&self) -> Vec<&str> {
        self.entries.iter().map(|(c, _)| c.as_str()).collect()
    }

    /// Render `col = value, col2 = value2` for an UPDATE statement.
    pub fn to_set_sql(&self) -> String {
        self.entries
            .iter()
            .map(|(column, assignment)| format!("{column} = {}", assignment.to_sql()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Split into aligned column and rendered-value lists for an INSERT.
    pub fn to_insert_parts(&self) -> (Vec<String>, Vec<String>) {
        let columns = self.entries.iter().map(|(c, _)| c.clone()).collect();
        let values = self
            .entries
            .iter()
            .map(|(_, assignment)| assignment.to_sql())
            .collect();
        (columns, values)
    }

    /// Merge `other` on top of `self`; later assignments win on conflict.
    pub fn merged_with(&self, other: &ChangeSet) -> ChangeSet {
        let mut merged = self.clone();
        for (column, assignment) in &other.entries {
            if let Some(existing) = merged.entries.iter_mut().find(|(c, _)| c == column) {
                existing.1 = assignment.clone();
            } else {
                merged.entries.push((column.clone(), assignment.clone()));
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_sql_rendering() {
        let changes = ChangeSet::new()
            .set("title", json!("Autumn retreat"))
            .set("max_participants", json!(50));
        assert_eq!(
            changes.to_set_sql(),
            "title = 'Autumn retreat', max_participants = 50"
        );
    }

    #[test]
    fn raw_expressions_are_embedded_verbatim() {
        let changes = ChangeSet::new()
            .set_raw("updated_at", "NOW()")
            .set_raw("failed_login_attempts", "failed_login_attempts + 1");
        assert_eq!(
            changes.to_set_sql(),
            "updated_at = NOW(), failed_login_attempts = failed_login_attempts + 1"
        );
    }

    #[test]
    fn insert_parts_align() {
        let changes = ChangeSet::new()
            .set("email", json!("anna@parish.org"))
            .set("is_active", json!(true));
        let (columns, values) = changes.to_insert_parts();
        assert_eq!(columns, vec!["email", "is_active"]);
        assert_eq!(values, vec!["'anna@parish.org'", "true"]);
    }

    #[test]
    fn merge_prefers_later_assignments() {
        let base = ChangeSet::new()
            .set("status", json!("draft"))
            .set("title", json!("a"));
        let overlay = ChangeSet::new().set("status", json!("submitted"));
        let merged = base.merged_with(&overlay);
        assert_eq!(merged.to_set_sql(), "status = 'submitted', title = 'a'");
    }

    #[test]
    fn null_values_render_as_sql_null() {
        let changes = ChangeSet::new().set("password_reset_token", json!(null));
        assert_eq!(changes.to_set_sql(), "password_reset_token = NULL");
    }
}

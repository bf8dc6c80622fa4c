/// A single SQL predicate.
#[derive(Debug, Clone)]
pub enum Condition {
    Simple {
        field: String,
        operator: String,
        value: serde_json::Value,
    },
    In {
        field: String,
        values: Vec<serde_json::Value>,
    },
    Like {
        field: String,
        pattern: String,
    },
    ILike {
        field: String,
        pattern: String,
    },
    IsNull {
        field: String,
    },
    IsNotNull {
        field: String,
    },
    Exists {
        subquery: String,
    },
    /// JSONB `?|`: any of `keys` present in the array/object at `field`.
    JsonHasAnyKeys {
        field: String,
        keys: Vec<String>,
    },
    Raw {
        sql: String,
    },
}

impl Condition {
    pub fn to_sql(&self) -> String {
        match self {
            Condition::Simple {
                field,
                operator,
                value,
            } => format!("{} {} {}", field, operator, format_value(value)),
            Condition::In { field, values } => {
                let value_list = values
                    .iter()
                    .map(format_value)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{field} IN ({value_list})")
            }
            Condition::Like { field, pattern } => {
                format!("{} LIKE {}", field, quote(pattern))
            }
            Condition::ILike { field, pattern } => {
                format!("{} ILIKE {}", field, quote(pattern))
            }
            Condition::IsNull { field } => format!("{field} IS NULL"),
            Condition::IsNotNull { field } => format!("{field} IS NOT NULL"),
            Condition::Exists { subquery } => format!("EXISTS ({subquery})"),
            Condition::JsonHasAnyKeys { field, keys } => {
                let key_list = keys.iter().map(|k| quote(k)).collect::<Vec<_>>().join(", ");
                format!("{field} ?| ARRAY[{key_list}]")
            }
            Condition::Raw { sql } => sql.clone(),
        }
    }

    pub fn eq(field: &str, value: serde_json::Value) -> Self {
        Condition::Simple {
            field: field.to_string(),
            operator: "=".to_string(),
            value,
        }
    }
}

/// A group of conditions joined by one logical operator.
#[derive(Debug, Clone)]
pub struct WhereClause {
    pub conditions: Vec<Condition>,
    pub operator: LogicalOperator,
}

#[derive(Debug, Clone)]
pub enum LogicalOperator {
    And,
    Or,
}

impl WhereClause {
    pub fn simple(field: &str, operator: &str, value: serde_json::Value) -> Self {
        Self::and(vec![Condition::Simple {
            field: field.to_string(),
            operator: operator.to_string(),
            value,
        }])
    }

    pub fn in_condition(field: &str, values: Vec<serde_json::Value>) -> Self {
        Self::and(vec![Condition::In {
            field: field.to_string(),
            values,
        }])
    }

    pub fn like(field: &str, pattern: &str) -> Self {
        Self::and(vec![Condition::Like {
            field: field.to_string(),
            pattern: pattern.to_string(),
        }])
    }

    pub fn is_null(field: &str) -> Self {
        Self::and(vec![Condition::IsNull {
            field: field.to_string(),
        }])
    }

    pub fn is_not_null(field: &str) -> Self {
        Self::and(vec![Condition::IsNotNull {
            field: field.to_string(),
        }])
    }

    pub fn exists(subquery: &str) -> Self {
        Self::and(vec![Condition::Exists {
            subquery: subquery.to_string(),
        }])
    }

    pub fn json_has_any_keys(field: &str, keys: Vec<String>) -> Self {
        Self::and(vec![Condition::JsonHasAnyKeys {
            field: field.to_string(),
            keys,
        }])
    }

    pub fn raw(sql: &str) -> Self {
        Self::and(vec![Condition::Raw {
            sql: sql.to_string(),
        }])
    }

    pub fn and(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            operator: LogicalOperator::And,
        }
    }

    pub fn or(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            operator: LogicalOperator::Or,
        }
    }

    pub fn to_sql(&self) -> String {
        if self.conditions.is_empty() {
            return "1=1".to_string();
        }

        if self.conditions.len() == 1 {
            return self.conditions[0].to_sql();
        }

        let operator_str = match self.operator {
            LogicalOperator::And => " AND ",
            LogicalOperator::Or => " OR ",
        };

        let condition_sqls: Vec<String> = self.conditions.iter().map(|c| c.to_sql()).collect();
        format!("({})", condition_sqls.join(operator_str))
    }
}

/// Render a JSON value as a SQL literal.
pub(crate) fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => quote(s),
        _ => quote(&value.to_string()),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn simple_condition_renders_literal() {
        let clause = WhereClause::simple("budget_year", "=", json!(2025));
        assert_eq!(clause.to_sql(), "budget_year = 2025");
    }

    #[test]
    fn string_literals_escape_quotes() {
        let clause = WhereClause::simple("title", "=", json!("St. Mark's retreat"));
        assert_eq!(clause.to_sql(), "title = 'St. Mark''s retreat'");
    }

    #[test]
    fn in_condition_renders_value_list() {
        let clause =
            WhereClause::in_condition("status", vec![json!("submitted"), json!("under_review")]);
        assert_eq!(clause.to_sql(), "status IN ('submitted', 'under_review')");
    }

    #[test]
    fn or_group_is_parenthesized() {
        let clause = WhereClause::or(vec![
            Condition::ILike {
                field: "title".to_string(),
                pattern: "%retreat%".to_string(),
            },
            Condition::ILike {
                field: "description".to_string(),
                pattern: "%retreat%".to_string(),
            },
        ]);
        assert_eq!(
            clause.to_sql(),
            "(title ILIKE '%retreat%' OR description ILIKE '%retreat%')"
        );
    }

    #[test]
    fn json_has_any_keys_renders_text_array() {
        let clause = WhereClause::json_has_any_keys(
            "metadata->'tags'",
            vec!["youth".to_string(), "summer".to_string()],
        );
        assert_eq!(
            clause.to_sql(),
            "metadata->'tags' ?| ARRAY['youth', 'summer']"
        );
    }

    #[test]
    fn empty_clause_is_always_true() {
        let clause = WhereClause::and(vec![]);
        assert_eq!(clause.to_sql(), "1=1");
    }
}

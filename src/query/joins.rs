/// JOIN flavors used by the repositories.
#[derive(Debug, Clone)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    pub fn to_sql(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

/// A SQL JOIN clause.
#[derive(Debug, Clone)]
pub struct Join {
    pub join_type: JoinType,
    pub table: String,
    pub on_condition: String,
}

impl Join {
    pub fn inner(table: &str, on_condition: &str) -> Self {
        Self {
            join_type: JoinType::Inner,
            table: table.to_string(),
            on_condition: on_condition.to_string(),
        }
    }

    pub fn left(table: &str, on_condition: &str) -> Self {
        Self {
            join_type: JoinType::Left,
            table: table.to_string(),
            on_condition: on_condition.to_string(),
        }
    }

    pub fn to_sql(&self) -> String {
        format!(
            "{} {} ON {}",
            self.join_type.to_sql(),
            self.table,
            self.on_condition
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_join_sql() {
        let join = Join::inner(
            "user_organizations uo",
            "uo.user_id = users.id",
        );
        assert_eq!(
            join.to_sql(),
            "INNER JOIN user_organizations uo ON uo.user_id = users.id"
        );
    }

    #[test]
    fn left_join_sql() {
        let join = Join::left("events e", "e.id = budgets.event_id");
        assert_eq!(join.to_sql(), "LEFT JOIN events e ON e.id = budgets.event_id");
    }
}

use std::time::Duration;

use sqlx::{PgPool, Row};

use super::{Join, Pagination, WhereClause};
use crate::error::{CoreError, Result};

/// Fluent SQL builder for the repository layer.
///
/// Assembles a SELECT statement from composable fragments and executes it
/// through sqlx's runtime query API. Values are rendered as SQL literals by
/// the condition types; identifiers come from compile-time constants on the
/// entity traits, never from user input.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    base_table: String,
    select_fields: Vec<String>,
    joins: Vec<Join>,
    where_clauses: Vec<WhereClause>,
    group_by: Vec<String>,
    order_by: Vec<String>,
    pagination: Option<Pagination>,
    cache_ttl: Option<Duration>,
    slow_threshold: Option<Duration>,
}

impl QueryBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            base_table: table.to_string(),
            select_fields: vec!["*".to_string()],
            joins: Vec::new(),
            where_clauses: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            pagination: None,
            cache_ttl: None,
            slow_threshold: None,
        }
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn inner_join(self, table: &str, on_condition: &str) -> Self {
        self.join(Join::inner(table, on_condition))
    }

    pub fn left_join(self, table: &str, on_condition: &str) -> Self {
        self.join(Join::left(table, on_condition))
    }

    pub fn where_clause(mut self, clause: WhereClause) -> Self {
        self.where_clauses.push(clause);
        self
    }

    pub fn where_eq(self, field: &str, value: serde_json::Value) -> Self {
        self.where_clause(WhereClause::simple(field, "=", value))
    }

    pub fn where_in(self, field: &str, values: Vec<serde_json::Value>) -> Self {
        self.where_clause(WhereClause::in_condition(field, values))
    }

    pub fn where_exists(self, subquery: &str) -> Self {
        self.where_clause(WhereClause::exists(subquery))
    }

    pub fn where_raw(self, sql: &str) -> Self {
        self.where_clause(WhereClause::raw(sql))
    }

    pub fn group_by(mut self, fields: &[&str]) -> Self {
        self.group_by.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: &str) -> Self {
        self.order_by.push(format!("{field} {direction}"));
        self
    }

    pub fn order_asc(self, field: &str) -> Self {
        self.order_by(field, "ASC")
    }

    pub fn order_desc(self, field: &str) -> Self {
        self.order_by(field, "DESC")
    }

    pub fn paginate(mut self, page: u32, per_page: u32) -> Self {
        self.pagination = Some(Pagination::new(page, per_page));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        if let Some(ref mut pagination) = self.pagination {
            pagination.limit = Some(limit);
        } else {
            self.pagination = Some(Pagination::limit_only(limit));
        }
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        if let Some(ref mut pagination) = self.pagination {
            pagination.offset = Some(offset);
        } else {
            self.pagination = Some(Pagination::offset_only(offset));
        }
        self
    }

    /// Opt this query's results into the time-boxed cache.
    pub fn cache(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl
    }

    /// Override the slow-query warning threshold for this query.
    pub fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    pub fn slow_threshold_value(&self) -> Option<Duration> {
        self.slow_threshold
    }

    pub fn build_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        sql.push_str(&self.select_fields.join(", "));
        sql.push_str(&format!(" FROM {}", self.base_table));

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.to_sql());
        }

        if !self.where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            let where_parts: Vec<String> = self
                .where_clauses
                .iter()
                .map(|clause| clause.to_sql())
                .collect();
            sql.push_str(&where_parts.join(" AND "));
        }

        if !self.group_by.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", self.group_by.join(", ")));
        }

        if !self.order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", self.order_by.join(", ")));
        }

        if let Some(ref pagination) = self.pagination {
            sql.push_str(&pagination.to_sql());
        }

        sql
    }

    pub async fn fetch_all<T>(&self, pool: &PgPool) -> Result<Vec<T>>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let sql = self.build_sql();
        sqlx::query_as::<_, T>(&sql)
            .fetch_all(pool)
            .await
            .map_err(|e| CoreError::from_sqlx("failed to fetch rows", e))
    }

    pub async fn fetch_one<T>(&self, pool: &PgPool) -> Result<T>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let sql = self.build_sql();
        sqlx::query_as::<_, T>(&sql)
            .fetch_one(pool)
            .await
            .map_err(|e| CoreError::from_sqlx("failed to fetch row", e))
    }

    pub async fn fetch_optional<T>(&self, pool: &PgPool) -> Result<Option<T>>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let sql = self.build_sql();
        sqlx::query_as::<_, T>(&sql)
            .fetch_optional(pool)
            .await
            .map_err(|e| CoreError::from_sqlx("failed to fetch row", e))
    }

    /// Count the rows the current filters select, ignoring ordering and
    /// pagination.
    pub async fn count(&self, pool: &PgPool) -> Result<i64> {
        let mut count_builder = self.clone();
        count_builder.select_fields = vec!["COUNT(*)".to_string()];
        count_builder.order_by.clear();
        count_builder.pagination = None;

        let sql = count_builder.build_sql();
        let row = sqlx::query(&sql)
            .fetch_one(pool)
            .await
            .map_err(|e| CoreError::from_sqlx("failed to count rows", e))?;

        row.try_get::<i64, _>(0)
            .map_err(|e| CoreError::from_sqlx("failed to count rows", e))
    }

    pub async fn exists(&self, pool: &PgPool) -> Result<bool> {
        let count = self.clone().limit(1).count(pool).await?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn basic_query_building() {
        let query = QueryBuilder::new("budgets")
            .select(&["id", "title", "status"])
            .where_eq("budget_year", json!(2025))
            .order_desc("created_at")
            .limit(10);

        let sql = query.build_sql();
        assert_eq!(
            sql,
            "SELECT id, title, status FROM budgets WHERE budget_year = 2025 \
             ORDER BY created_at DESC LIMIT 10"
        );
    }

    #[test]
    fn join_query_building() {
        let query = QueryBuilder::new("users")
            .inner_join("user_organizations uo", "uo.user_id = users.id")
            .where_eq("uo.organization_id", json!("7e6f"));

        let sql = query.build_sql();
        assert!(sql.contains("INNER JOIN user_organizations uo ON uo.user_id = users.id"));
        assert!(sql.contains("uo.organization_id = '7e6f'"));
    }

    #[test]
    fn multiple_clauses_join_with_and() {
        let query = QueryBuilder::new("events")
            .where_eq("is_cancelled", json!(false))
            .where_raw("start_date > CURRENT_DATE");

        assert_eq!(
            query.build_sql(),
            "SELECT * FROM events WHERE is_cancelled = false AND start_date > CURRENT_DATE"
        );
    }

    #[test]
    fn group_by_rendering() {
        let query = QueryBuilder::new("users")
            .select(&["role", "COUNT(*) AS count"])
            .group_by(&["role"]);

        assert_eq!(
            query.build_sql(),
            "SELECT role, COUNT(*) AS count FROM users GROUP BY role"
        );
    }

    #[test]
    fn pagination_rendering() {
        let query = QueryBuilder::new("events").paginate(3, 25);
        assert!(query.build_sql().ends_with(" LIMIT 25 OFFSET 50"));
    }
}

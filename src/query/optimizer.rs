use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, error, warn};

use super::builder::QueryBuilder;
use super::cache::QueryResultCache;
use super::conditions::{Condition, WhereClause};
use super::metrics::{MetricsRecorder, QueryMetrics, QueryPerformanceReport};
use crate::error::{CoreError, Result};

/// Offsets past this degrade linearly with table size; flag them.
const LARGE_OFFSET_WARNING: u32 = 10_000;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const DEFAULT_SLOW_QUERY_WARNING: Duration = Duration::from_millis(1000);

/// Per-query optimization knobs. Pure configuration, no runtime state.
#[derive(Debug, Clone)]
pub struct QueryOptimizationOptions {
    pub enable_query_cache: bool,
    pub cache_ttl: Duration,
    /// Callers set this when they intend to load relations up front via
    /// [`QueryOptimizer::with_relations`] instead of per-row follow-up reads.
    pub prevent_n_plus_one: bool,
    /// Executions beyond this are logged at WARN.
    pub max_execution_time: Duration,
}

impl Default for QueryOptimizationOptions {
    fn default() -> Self {
        Self {
            enable_query_cache: false,
            cache_ttl: DEFAULT_CACHE_TTL,
            prevent_n_plus_one: false,
            max_execution_time: DEFAULT_SLOW_QUERY_WARNING,
        }
    }
}

/// A named relation to load alongside the base rows with one LEFT JOIN.
#[derive(Debug, Clone)]
pub struct Relation {
    pub name: String,
    pub table: String,
    pub on_condition: String,
}

impl Relation {
    pub fn new(name: &str, table: &str, on_condition: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            on_condition: on_condition.to_string(),
        }
    }
}

/// Index usage snapshot from `pg_stat_user_indexes`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IndexUsage {
    pub schema_name: String,
    pub table_name: String,
    pub index_name: String,
    pub index_scans: i64,
    pub tuples_read: i64,
    pub tuples_fetched: i64,
}

/// Builds and instruments query-builder chains. Convenience and
/// observability only: no transaction semantics, no automatic rewriting.
#[derive(Clone)]
pub struct QueryOptimizer {
    pool: PgPool,
    metrics: MetricsRecorder,
    cache: QueryResultCache,
}

impl QueryOptimizer {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            metrics: MetricsRecorder::new(),
            cache: QueryResultCache::new(),
        }
    }

    /// Start a builder for `table`, applying the option set.
    pub fn create_optimized_query(
        &self,
        table: &str,
        options: &QueryOptimizationOptions,
    ) -> QueryBuilder {
        let mut builder = QueryBuilder::new(table);
        if options.enable_query_cache {
            builder = builder.cache(options.cache_ttl);
        }
        builder.slow_threshold(options.max_execution_time)
    }

    /// One LEFT JOIN per relation so callers fetch everything in a single
    /// round trip instead of a follow-up query per row.
    pub fn with_relations(&self, mut builder: QueryBuilder, relations: &[Relation]) -> QueryBuilder {
        for relation in relations {
            debug!(relation = %relation.name, "joining relation");
            builder = builder.left_join(&relation.table, &relation.on_condition);
        }
        builder
    }

    /// Apply LIMIT/OFFSET from 1-indexed page math. Large offsets are legal
    /// but slow; the warning points callers at cursor pagination.
    pub fn paginate(&self, builder: QueryBuilder, page: u32, limit: u32) -> QueryBuilder {
        let offset = page.saturating_sub(1) * limit;

        if offset > LARGE_OFFSET_WARNING {
            warn!(
                offset,
                "large offset detected, consider cursor-based pagination"
            );
        }

        builder.limit(limit).offset(offset)
    }

    /// Dynamic WHERE construction from a set of optional filters:
    /// null and empty-string values are skipped, arrays become `IN`,
    /// strings containing `%` become `LIKE`, everything else is equality.
    pub fn apply_filters(
        &self,
        mut builder: QueryBuilder,
        filters: &[(&str, serde_json::Value)],
    ) -> QueryBuilder {
        for (field, value) in filters {
            match value {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) if s.is_empty() => continue,
                serde_json::Value::Array(values) => {
                    if values.is_empty() {
                        continue;
                    }
                    builder = builder.where_in(field, values.clone());
                }
                serde_json::Value::String(s) if s.contains('%') => {
                    builder = builder.where_clause(WhereClause::like(field, s));
                }
                other => {
                    builder = builder.where_eq(field, other.clone());
                }
            }
        }
        builder
    }

    /// Independently optional lower/upper bounds on a date column.
    pub fn date_range(
        &self,
        mut builder: QueryBuilder,
        field: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> QueryBuilder {
        if let Some(start) = start {
            builder = builder.where_clause(WhereClause::simple(
                field,
                ">=",
                serde_json::Value::String(start.to_rfc3339()),
            ));
        }
        if let Some(end) = end {
            builder = builder.where_clause(WhereClause::simple(
                field,
                "<=",
                serde_json::Value::String(end.to_rfc3339()),
            ));
        }
        builder
    }

    /// OR-ed per-field case-insensitive match. No-op on blank input.
    pub fn full_text_search(
        &self,
        builder: QueryBuilder,
        fields: &[&str],
        query: &str,
    ) -> QueryBuilder {
        let trimmed = query.trim();
        if trimmed.is_empty() || fields.is_empty() {
            return builder;
        }

        let escaped = trimmed.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let pattern = format!("%{escaped}%");
        let conditions: Vec<Condition> = fields
            .iter()
            .map(|field| Condition::ILike {
                field: field.to_string(),
                pattern: pattern.clone(),
            })
            .collect();

        builder.where_clause(WhereClause::or(conditions))
    }

    /// Execute a builder with timing, metrics recording, slow-query warnings,
    /// and the opt-in result cache.
    pub async fn execute_with_monitoring<T>(&self, builder: &QueryBuilder) -> Result<Vec<T>>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow>
            + Serialize
            + DeserializeOwned
            + Send
            + Unpin,
    {
        let sql = builder.build_sql();

        if builder.cache_ttl().is_some() {
            if let Some(cached) = self.cache.get(&sql).await {
                let rows: Vec<T> = serde_json::from_value(cached)
                    .map_err(|e| CoreError::Query(format!("cached result decode failed: {e}")))?;
                self.metrics.record(QueryMetrics {
                    execution_time_ms: 0,
                    query_text: sql,
                    row_count: rows.len(),
                    cache_hit: true,
                    recorded_at: Utc::now(),
                });
                return Ok(rows);
            }
        }

        let started = Instant::now();
        match sqlx::query_as::<_, T>(&sql).fetch_all(&self.pool).await {
            Ok(rows) => {
                let elapsed = started.elapsed();
                self.metrics.record(QueryMetrics {
                    execution_time_ms: elapsed.as_millis() as u64,
                    query_text: sql.clone(),
                    row_count: rows.len(),
                    cache_hit: false,
                    recorded_at: Utc::now(),
                });

                let threshold = builder
                    .slow_threshold_value()
                    .unwrap_or(DEFAULT_SLOW_QUERY_WARNING);
                if elapsed > threshold {
                    warn!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        query = %excerpt(&sql),
                        "slow query detected"
                    );
                }

                if let Some(ttl) = builder.cache_ttl() {
                    if let Ok(value) = serde_json::to_value(&rows) {
                        self.cache.set(sql, value, ttl).await;
                    }
                }

                Ok(rows)
            }
            Err(e) => {
                error!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    query = %excerpt(&sql),
                    "query execution failed: {e}"
                );
                Err(CoreError::from_sqlx("query execution failed", e))
            }
        }
    }

    pub fn performance_stats(&self) -> QueryPerformanceReport {
        self.metrics.report()
    }

    /// Read-only introspection of index usage for one table.
    pub async fn analyze_index_usage(&self, table_name: &str) -> Result<Vec<IndexUsage>> {
        let rows = sqlx::query_as::<_, IndexUsage>(
            "SELECT schemaname AS schema_name, \
                    relname AS table_name, \
                    indexrelname AS index_name, \
                    idx_scan AS index_scans, \
                    idx_tup_read AS tuples_read, \
                    idx_tup_fetch AS tuples_fetched \
             FROM pg_stat_user_indexes \
             WHERE relname = $1 \
             ORDER BY idx_scan DESC",
        )
        .bind(table_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::from_sqlx("failed to analyze index usage", e))?;

        Ok(rows)
    }

    /// Run the builder's query through `EXPLAIN ANALYZE` and return the plan
    /// lines. The query does execute.
    pub async fn explain_query(&self, builder: &QueryBuilder) -> Result<Vec<String>> {
        let sql = format!("EXPLAIN ANALYZE {}", builder.build_sql());
        sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::from_sqlx("failed to explain query", e))
    }
}

fn excerpt(sql: &str) -> String {
    if sql.len() <= 120 {
        sql.to_string()
    } else {
        let cut: String = sql.chars().take(120).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn optimizer() -> QueryOptimizer {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgresql://localhost/parish_ledger_test")
            .expect("lazy pool");
        QueryOptimizer::new(pool)
    }

    #[tokio::test]
    async fn filters_skip_null_and_empty_values() {
        let opt = optimizer();
        let builder = opt.apply_filters(
            QueryBuilder::new("events"),
            &[
                ("status", json!(null)),
                ("location", json!("")),
                ("event_type", json!("retreat")),
            ],
        );
        assert_eq!(
            builder.build_sql(),
            "SELECT * FROM events WHERE event_type = 'retreat'"
        );
    }

    #[tokio::test]
    async fn filters_use_in_for_arrays() {
        let opt = optimizer();
        let builder = opt.apply_filters(
            QueryBuilder::new("budgets"),
            &[("status", json!(["submitted", "under_review"]))],
        );
        assert_eq!(
            builder.build_sql(),
            "SELECT * FROM budgets WHERE status IN ('submitted', 'under_review')"
        );
    }

    #[tokio::test]
    async fn filters_skip_empty_arrays() {
        let opt = optimizer();
        let builder =
            opt.apply_filters(QueryBuilder::new("budgets"), &[("status", json!([]))]);
        assert_eq!(builder.build_sql(), "SELECT * FROM budgets");
    }

    #[tokio::test]
    async fn filters_use_like_for_wildcard_strings() {
        let opt = optimizer();
        let builder = opt.apply_filters(
            QueryBuilder::new("users"),
            &[("email", json!("%@parish.org"))],
        );
        assert_eq!(
            builder.build_sql(),
            "SELECT * FROM users WHERE email LIKE '%@parish.org'"
        );
    }

    #[tokio::test]
    async fn filters_use_equality_otherwise() {
        let opt = optimizer();
        let builder = opt.apply_filters(
            QueryBuilder::new("users"),
            &[("is_active", json!(true)), ("failed_login_attempts", json!(3))],
        );
        assert_eq!(
            builder.build_sql(),
            "SELECT * FROM users WHERE is_active = true AND failed_login_attempts = 3"
        );
    }

    #[tokio::test]
    async fn full_text_search_is_noop_on_blank_query() {
        let opt = optimizer();
        let builder =
            opt.full_text_search(QueryBuilder::new("events"), &["title", "description"], "   ");
        assert_eq!(builder.build_sql(), "SELECT * FROM events");
    }

    #[tokio::test]
    async fn full_text_search_ors_fields() {
        let opt = optimizer();
        let builder =
            opt.full_text_search(QueryBuilder::new("events"), &["title", "description"], "choir");
        assert_eq!(
            builder.build_sql(),
            "SELECT * FROM events WHERE (title ILIKE '%choir%' OR description ILIKE '%choir%')"
        );
    }

    #[tokio::test]
    async fn full_text_search_escapes_wildcards() {
        let opt = optimizer();
        let builder = opt.full_text_search(QueryBuilder::new("events"), &["title"], "50%");
        assert_eq!(
            builder.build_sql(),
            "SELECT * FROM events WHERE title ILIKE '%50\\%%'"
        );
    }

    #[tokio::test]
    async fn paginate_applies_skip_take() {
        let opt = optimizer();
        let builder = opt.paginate(QueryBuilder::new("events"), 2, 10);
        assert!(builder.build_sql().ends_with(" LIMIT 10 OFFSET 10"));
    }

    #[tokio::test]
    async fn date_range_applies_optional_bounds() {
        let opt = optimizer();
        let start = DateTime::parse_from_rfc3339("2025-01-01T00:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc);
        let builder = opt.date_range(QueryBuilder::new("events"), "start_date", Some(start), None);
        assert_eq!(
            builder.build_sql(),
            "SELECT * FROM events WHERE start_date >= '2025-01-01T00:00:00+00:00'"
        );
    }

    #[tokio::test]
    async fn relations_become_left_joins() {
        let opt = optimizer();
        let builder = opt.with_relations(
            QueryBuilder::new("budgets"),
            &[Relation::new("event", "events", "events.id = budgets.event_id")],
        );
        assert!(builder
            .build_sql()
            .contains("LEFT JOIN events ON events.id = budgets.event_id"));
    }

    #[tokio::test]
    async fn optimized_query_carries_cache_ttl() {
        let opt = optimizer();
        let options = QueryOptimizationOptions {
            enable_query_cache: true,
            ..Default::default()
        };
        let builder = opt.create_optimized_query("budgets", &options);
        assert_eq!(builder.cache_ttl(), Some(DEFAULT_CACHE_TTL));
    }
}

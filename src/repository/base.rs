use std::marker::PhantomData;
use std::time::Duration;

use sqlx::{PgConnection, PgPool};
use tracing::{debug, warn};

use super::entity::{ChangeSet, Entity, NewEntity, SoftDeletable, Versioned};
use crate::error::{CoreError, Result};
use crate::query::conditions::format_value;
use crate::query::{
    Condition, Page, PageRequest, QueryBuilder, QueryOptimizationOptions, QueryOptimizer,
    QueryPerformanceReport, Relation, WhereClause,
};
use crate::transaction::{
    LockMode, TransactionManager, TransactionOptions, TransactionSnapshot, TxFuture, TxOperation,
};

pub const DEFAULT_BULK_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Read options: filters, ordering, and an optional window.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub conditions: Vec<Condition>,
    pub order_by: Vec<(String, SortDirection)>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn order(mut self, field: &str, direction: SortDirection) -> Self {
        self.order_by.push((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Aggregate over one numeric column. Every component defaults to zero on an
/// empty result set; no NULL leaks out.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct FieldStatistics {
    pub count: i64,
    pub average: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub sum: f64,
}

/// Uniform data-access surface for one entity type.
///
/// Thin orchestration over sqlx: identifier positions in generated SQL come
/// from the [`Entity`] constants, id lookups use bound parameters, filter
/// values render as escaped literals through the query builder. Every method
/// wraps the underlying failure with an operation-specific prefix; treat the
/// result as fatal to the call — retry policy lives in the transaction
/// manager, not here.
#[derive(Clone)]
pub struct Repository<E: Entity> {
    pool: PgPool,
    optimizer: QueryOptimizer,
    transactions: TransactionManager,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Repository<E> {
    pub fn new(pool: &PgPool, transactions: &TransactionManager) -> Self {
        Self {
            pool: pool.clone(),
            optimizer: QueryOptimizer::new(pool.clone()),
            transactions: transactions.clone(),
            _entity: PhantomData,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn optimizer(&self) -> &QueryOptimizer {
        &self.optimizer
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    /// Start a query builder against this entity's table.
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new(E::TABLE)
    }

    // ----- create -----

    pub async fn create<N>(&self, data: &N) -> Result<E>
    where
        N: NewEntity<Entity = E>,
    {
        let sql = Self::insert_sql(&data.columns(), std::slice::from_ref(&data.values()));
        sqlx::query_as::<_, E>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                CoreError::from_sqlx(&format!("failed to create {} row", E::TABLE), e)
            })
    }

    pub async fn create_many<N>(&self, data: &[N]) -> Result<Vec<E>>
    where
        N: NewEntity<Entity = E>,
    {
        if data.is_empty() {
            return Ok(Vec::new());
        }

        let columns = data[0].columns();
        let rows: Vec<Vec<serde_json::Value>> = data.iter().map(|item| item.values()).collect();
        let sql = Self::insert_sql(&columns, &rows);
        sqlx::query_as::<_, E>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                CoreError::from_sqlx(&format!("failed to create {} rows", E::TABLE), e)
            })
    }

    // ----- read -----

    pub async fn find_by_id(&self, id: &E::Id) -> Result<Option<E>> {
        let sql = format!("SELECT * FROM {} WHERE {} = $1", E::TABLE, E::ID_COLUMN);
        sqlx::query_as::<_, E>(&sql)
            .bind(id.clone())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                CoreError::from_sqlx(&format!("failed to find {} by id", E::TABLE), e)
            })
    }

    pub async fn find_one(&self, conditions: Vec<Condition>) -> Result<Option<E>> {
        let mut builder = self.query().limit(1);
        if !conditions.is_empty() {
            builder = builder.where_clause(WhereClause::and(conditions));
        }
        builder.fetch_optional(&self.pool).await
    }

    pub async fn find_many(&self, options: &FindOptions) -> Result<Vec<E>> {
        self.builder_from(options).fetch_all(&self.pool).await
    }

    /// Data slice plus total matching count, for pagination consumers.
    pub async fn find_and_count(&self, options: &FindOptions) -> Result<(Vec<E>, u64)> {
        let builder = self.builder_from(options);
        let data = builder.fetch_all(&self.pool).await?;
        let total = builder.count(&self.pool).await?;
        Ok((data, total as u64))
    }

    /// Paginated read. `request.limit` must be at least 1 — a documented
    /// caller contract, not a validated input.
    pub async fn find_with_pagination(
        &self,
        request: PageRequest,
        options: &FindOptions,
    ) -> Result<Page<E>> {
        let mut windowed = options.clone();
        windowed.limit = Some(request.limit);
        windowed.offset = Some(request.skip());

        let builder = self.builder_from(&windowed);
        let data = builder.fetch_all(&self.pool).await?;
        let total = builder.count(&self.pool).await?;

        Ok(Page::from_parts(data, total as u64, request.page, request.limit))
    }

    pub async fn count(&self, conditions: Vec<Condition>) -> Result<u64> {
        let mut builder = self.query();
        if !conditions.is_empty() {
            builder = builder.where_clause(WhereClause::and(conditions));
        }
        Ok(builder.count(&self.pool).await? as u64)
    }

    pub async fn exists(&self, conditions: Vec<Condition>) -> Result<bool> {
        Ok(self.count(conditions).await? > 0)
    }

    // ----- update -----

    /// Apply `changes` and return the row as persisted, re-fetched after the
    /// write so the caller sees exactly what the database holds.
    pub async fn update(&self, id: &E::Id, changes: &ChangeSet) -> Result<Option<E>> {
        if changes.is_empty() {
            return self.find_by_id(id).await;
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = $1",
            E::TABLE,
            changes.to_set_sql(),
            E::ID_COLUMN
        );
        sqlx::query(&sql)
            .bind(id.clone())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                CoreError::from_sqlx(&format!("failed to update {} row", E::TABLE), e)
            })?;

        self.find_by_id(id).await
    }

    pub async fn update_many(
        &self,
        conditions: Vec<Condition>,
        changes: &ChangeSet,
    ) -> Result<u64> {
        if changes.is_empty() {
            return Ok(0);
        }

        let mut sql = format!("UPDATE {} SET {}", E::TABLE, changes.to_set_sql());
        if !conditions.is_empty() {
            sql.push_str(&format!(" WHERE {}", WhereClause::and(conditions).to_sql()));
        }
        let result = sqlx::query(&sql).execute(&self.pool).await.map_err(|e| {
            CoreError::from_sqlx(&format!("failed to update {} rows", E::TABLE), e)
        })?;
        Ok(result.rows_affected())
    }

    /// Read-then-write upsert on the `key` columns. Not atomic: two
    /// concurrent upserts on the same absent key can both take the create
    /// path. Callers that own a unique index and need atomicity should issue
    /// the database's native ON CONFLICT through [`Self::run_in_transaction`].
    pub async fn upsert(
        &self,
        key: &[(&str, serde_json::Value)],
        update: &ChangeSet,
        create: Option<&ChangeSet>,
    ) -> Result<E> {
        let conditions: Vec<Condition> = key
            .iter()
            .map(|(column, value)| Condition::eq(column, value.clone()))
            .collect();

        if let Some(existing) = self.find_one(conditions).await? {
            if update.is_empty() {
                return Ok(existing);
            }
            let id = existing.id().clone();
            return self.update(&id, update).await?.ok_or_else(|| {
                CoreError::NotFound(format!("{} {} vanished during upsert", E::TABLE, id))
            });
        }

        let create_changes = match create {
            Some(changes) => changes.clone(),
            None => {
                let mut from_key = ChangeSet::new();
                for (column, value) in key {
                    from_key = from_key.set(column, value.clone());
                }
                from_key.merged_with(update)
            }
        };
        let (columns, values) = create_changes.to_insert_parts();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            E::TABLE,
            columns.join(", "),
            values.join(", ")
        );
        sqlx::query_as::<_, E>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                CoreError::from_sqlx(&format!("failed to upsert {} row", E::TABLE), e)
            })
    }

    // ----- delete -----

    /// Hard delete. Returns the number of rows removed.
    pub async fn delete(&self, id: &E::Id) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE {} = $1", E::TABLE, E::ID_COLUMN);
        let result = sqlx::query(&sql)
            .bind(id.clone())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                CoreError::from_sqlx(&format!("failed to delete {} row", E::TABLE), e)
            })?;
        Ok(result.rows_affected())
    }

    pub async fn delete_many(&self, ids: &[E::Id]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let id_list = ids
            .iter()
            .map(|id| format_value(&E::id_value(id)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "DELETE FROM {} WHERE {} IN ({})",
            E::TABLE,
            E::ID_COLUMN,
            id_list
        );
        let result = sqlx::query(&sql).execute(&self.pool).await.map_err(|e| {
            CoreError::from_sqlx(&format!("failed to delete {} rows", E::TABLE), e)
        })?;
        Ok(result.rows_affected())
    }

    pub async fn delete_where(&self, conditions: Vec<Condition>) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            E::TABLE,
            WhereClause::and(conditions).to_sql()
        );
        let result = sqlx::query(&sql).execute(&self.pool).await.map_err(|e| {
            CoreError::from_sqlx(&format!("failed to delete {} rows by condition", E::TABLE), e)
        })?;
        Ok(result.rows_affected())
    }

    // ----- bulk -----

    /// Chunked insert: `ceil(len/chunk_size)` sequential chunk statements.
    /// A mid-stream failure leaves earlier chunks committed; bulk-load
    /// semantics, not atomicity.
    pub async fn bulk_insert<N>(&self, items: &[N], chunk_size: usize) -> Result<Vec<E>>
    where
        N: NewEntity<Entity = E>,
    {
        if chunk_size == 0 {
            return Err(CoreError::Configuration(
                "bulk insert chunk_size must be at least 1".to_string(),
            ));
        }

        debug!(
            rows = items.len(),
            chunks = chunk_count(items.len(), chunk_size),
            table = E::TABLE,
            "bulk insert"
        );

        let mut results = Vec::with_capacity(items.len());
        for chunk in items.chunks(chunk_size) {
            match self.create_many(chunk).await {
                Ok(mut saved) => results.append(&mut saved),
                Err(err) => {
                    warn!(
                        inserted = results.len(),
                        total = items.len(),
                        table = E::TABLE,
                        "bulk insert aborted mid-stream: {err}"
                    );
                    return Err(err);
                }
            }
        }
        Ok(results)
    }

    // ----- statistics -----

    /// count/average/min/max/sum over one numeric column, zeros on an empty
    /// set.
    pub async fn get_statistics(
        &self,
        field: &str,
        conditions: Vec<Condition>,
    ) -> Result<FieldStatistics> {
        let sql = Self::statistics_sql(field, &conditions);
        sqlx::query_as::<_, FieldStatistics>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                CoreError::from_sqlx(&format!("failed to get {} statistics", E::TABLE), e)
            })
    }

    // ----- transactions -----

    pub async fn run_in_transaction<T, F>(&self, op: F) -> Result<T>
    where
        T: Send,
        F: for<'c> Fn(&'c mut PgConnection) -> TxFuture<'c, T> + Send + Sync,
    {
        self.transactions
            .execute_transaction(op, &TransactionOptions::default())
            .await
    }

    pub async fn execute_in_transaction<T, F>(
        &self,
        op: F,
        options: &TransactionOptions,
    ) -> Result<T>
    where
        T: Send,
        F: for<'c> Fn(&'c mut PgConnection) -> TxFuture<'c, T> + Send + Sync,
    {
        self.transactions.execute_transaction(op, options).await
    }

    pub async fn execute_batch_in_transaction<T>(
        &self,
        operations: Vec<TxOperation<T>>,
        options: &TransactionOptions,
    ) -> Result<Vec<T>>
    where
        T: Send,
    {
        self.transactions
            .execute_batch_transaction(operations, options)
            .await
    }

    pub async fn update_with_optimistic_lock<T, F>(
        &self,
        id: &E::Id,
        op: F,
        max_retries: u32,
    ) -> Result<T>
    where
        E: Versioned,
        T: Send,
        F: for<'c> Fn(E, &'c mut PgConnection) -> TxFuture<'c, T> + Send + Sync,
    {
        self.transactions
            .execute_with_optimistic_locking::<E, T, F>(id, op, max_retries)
            .await
    }

    pub async fn update_with_pessimistic_lock<T, F>(
        &self,
        id: &E::Id,
        op: F,
        mode: LockMode,
    ) -> Result<T>
    where
        T: Send,
        F: for<'c> Fn(E, &'c mut PgConnection) -> TxFuture<'c, T> + Send + Sync,
    {
        self.transactions
            .execute_with_pessimistic_locking::<E, T, F>(id, op, mode)
            .await
    }

    pub async fn execute_read_only_transaction<T, F>(&self, op: F) -> Result<T>
    where
        T: Send,
        F: for<'c> Fn(&'c mut PgConnection) -> TxFuture<'c, T> + Send + Sync,
    {
        self.transactions.execute_read_only_transaction(op).await
    }

    /// One transaction per chunk of `items`, sequential; see
    /// [`TransactionManager::execute_bulk_operation`].
    pub async fn execute_bulk_in_chunks<I, F>(
        &self,
        items: &[I],
        op: F,
        chunk_size: usize,
        options: &TransactionOptions,
    ) -> Result<()>
    where
        I: Sync,
        F: for<'c> Fn(&'c [I], &'c mut PgConnection) -> TxFuture<'c, ()> + Send + Sync,
    {
        self.transactions
            .execute_bulk_operation(items, op, chunk_size, options)
            .await
    }

    // ----- optimized reads -----

    /// Full-text-style OR matching across `fields`, then conditional
    /// filters, then pagination. Falls back to a single unpaginated page
    /// when no pagination is supplied.
    pub async fn search_optimized(
        &self,
        query: &str,
        fields: &[&str],
        filters: &[(&str, serde_json::Value)],
        pagination: Option<PageRequest>,
    ) -> Result<Page<E>> {
        let options = QueryOptimizationOptions {
            enable_query_cache: true,
            prevent_n_plus_one: true,
            ..Default::default()
        };
        let mut builder = self.optimizer.create_optimized_query(E::TABLE, &options);
        builder = self.optimizer.full_text_search(builder, fields, query);
        builder = self.optimizer.apply_filters(builder, filters);

        match pagination {
            Some(request) => {
                let total = builder.count(&self.pool).await? as u64;
                let builder = self.optimizer.paginate(builder, request.page, request.limit);
                let data = self.optimizer.execute_with_monitoring::<E>(&builder).await?;
                Ok(Page::from_parts(data, total, request.page, request.limit))
            }
            None => {
                let data = self.optimizer.execute_with_monitoring::<E>(&builder).await?;
                Ok(Page::unpaginated(data))
            }
        }
    }

    /// `field >= start` and/or `field <= end`, optionally paginated.
    pub async fn find_by_date_range(
        &self,
        field: &str,
        start: Option<chrono::DateTime<chrono::Utc>>,
        end: Option<chrono::DateTime<chrono::Utc>>,
        pagination: Option<PageRequest>,
    ) -> Result<Page<E>> {
        let options = QueryOptimizationOptions {
            enable_query_cache: true,
            ..Default::default()
        };
        let builder = self.optimizer.create_optimized_query(E::TABLE, &options);
        let builder = self.optimizer.date_range(builder, field, start, end);

        match pagination {
            Some(request) => {
                let total = builder.count(&self.pool).await? as u64;
                let builder = self.optimizer.paginate(builder, request.page, request.limit);
                let data = self.optimizer.execute_with_monitoring::<E>(&builder).await?;
                Ok(Page::from_parts(data, total, request.page, request.limit))
            }
            None => {
                let data = self.optimizer.execute_with_monitoring::<E>(&builder).await?;
                Ok(Page::unpaginated(data))
            }
        }
    }

    /// Filtered read through the time-boxed result cache.
    pub async fn find_with_cache(&self, options: &FindOptions, ttl: Duration) -> Result<Vec<E>> {
        let builder = self.builder_from(options).cache(ttl);
        self.optimizer.execute_with_monitoring::<E>(&builder).await
    }

    /// Single-row read with relations preloaded via LEFT JOINs.
    pub async fn find_with_relations(
        &self,
        conditions: Vec<Condition>,
        relations: &[Relation],
    ) -> Result<Option<E>> {
        let options = QueryOptimizationOptions {
            enable_query_cache: true,
            prevent_n_plus_one: true,
            ..Default::default()
        };
        let base_columns = format!("{}.*", E::TABLE);
        let mut builder = self
            .optimizer
            .create_optimized_query(E::TABLE, &options)
            .select(&[base_columns.as_str()]);
        if !conditions.is_empty() {
            builder = builder.where_clause(WhereClause::and(conditions));
        }
        let builder = self.optimizer.with_relations(builder, relations);
        builder.fetch_optional(&self.pool).await
    }

    // ----- diagnostics -----

    pub fn query_performance_stats(&self) -> QueryPerformanceReport {
        self.optimizer.performance_stats()
    }

    pub async fn analyze_index_usage(&self) -> Result<Vec<crate::query::IndexUsage>> {
        self.optimizer.analyze_index_usage(E::TABLE).await
    }

    pub async fn explain(&self, builder: &QueryBuilder) -> Result<Vec<String>> {
        self.optimizer.explain_query(builder).await
    }

    pub fn active_transactions(&self) -> Vec<TransactionSnapshot> {
        self.transactions.active_transactions()
    }

    pub fn long_running_transactions(&self, threshold: Duration) -> Vec<TransactionSnapshot> {
        self.transactions.long_running_transactions(threshold)
    }

    // ----- helpers -----

    fn builder_from(&self, options: &FindOptions) -> QueryBuilder {
        let mut builder = self.query();
        if !options.conditions.is_empty() {
            builder = builder.where_clause(WhereClause::and(options.conditions.clone()));
        }
        for (field, direction) in &options.order_by {
            builder = builder.order_by(field, direction.as_sql());
        }
        if let Some(limit) = options.limit {
            builder = builder.limit(limit);
        }
        if let Some(offset) = options.offset {
            builder = builder.offset(offset);
        }
        builder
    }

    fn insert_sql(columns: &[&'static str], rows: &[Vec<serde_json::Value>]) -> String {
        let rendered_rows: Vec<String> = rows
            .iter()
            .map(|row| {
                let values: Vec<String> = row.iter().map(format_value).collect();
                format!("({})", values.join(", "))
            })
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES {} RETURNING *",
            E::TABLE,
            columns.join(", "),
            rendered_rows.join(", ")
        )
    }

    fn statistics_sql(field: &str, conditions: &[Condition]) -> String {
        let mut sql = format!(
            "SELECT COUNT({field}) AS count, \
             COALESCE(AVG({field}), 0)::float8 AS average, \
             COALESCE(MIN({field}), 0)::float8 AS minimum, \
             COALESCE(MAX({field}), 0)::float8 AS maximum, \
             COALESCE(SUM({field}), 0)::float8 AS sum \
             FROM {table}",
            field = field,
            table = E::TABLE
        );
        if !conditions.is_empty() {
            sql.push_str(&format!(
                " WHERE {}",
                WhereClause::and(conditions.to_vec()).to_sql()
            ));
        }
        sql
    }
}

impl<E: SoftDeletable> Repository<E> {
    /// Mark the row logically deleted. Returns the row (with its deletion
    /// timestamp) or `None` when it does not exist.
    pub async fn soft_delete(&self, id: &E::Id) -> Result<Option<E>> {
        let sql = format!(
            "UPDATE {table} SET {deleted} = NOW() WHERE {id_col} = $1 AND {deleted} IS NULL",
            table = E::TABLE,
            deleted = E::DELETED_AT_COLUMN,
            id_col = E::ID_COLUMN
        );
        sqlx::query(&sql)
            .bind(id.clone())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                CoreError::from_sqlx(&format!("failed to soft delete {} row", E::TABLE), e)
            })?;

        self.find_by_id(id).await
    }

    /// Clear the deletion marker. Returns the number of rows restored.
    pub async fn restore(&self, id: &E::Id) -> Result<u64> {
        let sql = format!(
            "UPDATE {table} SET {deleted} = NULL WHERE {id_col} = $1",
            table = E::TABLE,
            deleted = E::DELETED_AT_COLUMN,
            id_col = E::ID_COLUMN
        );
        let result = sqlx::query(&sql)
            .bind(id.clone())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                CoreError::from_sqlx(&format!("failed to restore {} row", E::TABLE), e)
            })?;
        Ok(result.rows_affected())
    }
}

/// Chunks needed to cover `total` items at `chunk_size` per chunk.
pub(crate) fn chunk_count(total: usize, chunk_size: usize) -> usize {
    total.div_ceil(chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::User;
    use serde_json::json;

    fn repository() -> Repository<User> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgresql://localhost/parish_ledger_test")
            .expect("lazy pool");
        let transactions = TransactionManager::new(pool.clone());
        Repository::new(&pool, &transactions)
    }

    #[tokio::test]
    async fn chunk_count_is_ceiling_division() {
        assert_eq!(chunk_count(0, 1000), 0);
        assert_eq!(chunk_count(999, 1000), 1);
        assert_eq!(chunk_count(1000, 1000), 1);
        assert_eq!(chunk_count(1001, 1000), 2);
        assert_eq!(chunk_count(25, 10), 3);
    }

    #[tokio::test]
    async fn find_options_render_in_order() {
        let repo = repository();
        let options = FindOptions::new()
            .condition(Condition::eq("is_active", json!(true)))
            .order("created_at", SortDirection::Desc)
            .limit(5)
            .offset(10);
        assert_eq!(
            repo.builder_from(&options).build_sql(),
            "SELECT * FROM users WHERE is_active = true ORDER BY created_at DESC LIMIT 5 OFFSET 10"
        );
    }

    #[tokio::test]
    async fn insert_sql_renders_multi_row_values() {
        let sql = Repository::<User>::insert_sql(
            &["email", "name"],
            &[
                vec![json!("a@parish.org"), json!("A")],
                vec![json!("b@parish.org"), json!("B")],
            ],
        );
        assert_eq!(
            sql,
            "INSERT INTO users (email, name) VALUES ('a@parish.org', 'A'), \
             ('b@parish.org', 'B') RETURNING *"
        );
    }

    #[tokio::test]
    async fn statistics_sql_coalesces_every_aggregate_to_zero() {
        let sql = Repository::<User>::statistics_sql("failed_login_attempts", &[]);
        assert!(sql.contains("COUNT(failed_login_attempts) AS count"));
        assert!(sql.contains("COALESCE(AVG(failed_login_attempts), 0)::float8 AS average"));
        assert!(sql.contains("COALESCE(MIN(failed_login_attempts), 0)::float8 AS minimum"));
        assert!(sql.contains("COALESCE(MAX(failed_login_attempts), 0)::float8 AS maximum"));
        assert!(sql.contains("COALESCE(SUM(failed_login_attempts), 0)::float8 AS sum"));
        assert!(sql.ends_with("FROM users"));
    }

    #[tokio::test]
    async fn statistics_sql_appends_conditions() {
        let sql = Repository::<User>::statistics_sql(
            "failed_login_attempts",
            &[Condition::eq("is_active", json!(true))],
        );
        assert!(sql.ends_with("FROM users WHERE is_active = true"));
    }
}

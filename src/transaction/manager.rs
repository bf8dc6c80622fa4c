use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Postgres};
use tracing::{debug, error, warn};

use super::options::{LockMode, TransactionOptions};
use super::saga::{run_compensations, CompensationAction};
use crate::error::{CoreError, Result};
use crate::repository::entity::{Entity, Versioned};

/// Future returned by a transactional callback; borrows the transaction's
/// connection for its lifetime.
pub type TxFuture<'c, T> = BoxFuture<'c, Result<T>>;

/// A boxed transactional operation, callable across retry attempts. The
/// callback receives the transaction's connection and must perform all its
/// writes through it to stay inside the atomic unit; it must not retain the
/// connection past the returned future.
pub type TxOperation<T> =
    Box<dyn for<'c> Fn(&'c mut PgConnection) -> TxFuture<'c, T> + Send + Sync>;

const OPTIMISTIC_BACKOFF_STEP: Duration = Duration::from_millis(100);

/// Opaque handle for one registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TransactionId(u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx_{}", self.0)
    }
}

struct ActiveTransaction {
    label: Option<String>,
    started_at: DateTime<Utc>,
    started: Instant,
}

/// Read-only view of one active transaction, for diagnostics.
#[derive(Debug, Clone)]
pub struct TransactionSnapshot {
    pub id: TransactionId,
    pub label: Option<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

// Removes the registry entry on every exit path, including panics and early
// returns; the Rust stand-in for a `finally` block.
struct RegistryGuard {
    active: Arc<DashMap<TransactionId, ActiveTransaction>>,
    id: TransactionId,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.active.remove(&self.id);
    }
}

/// Lifecycle and policy around multi-statement atomic units of work.
///
/// Owns the active-transaction registry; construct once at startup and share
/// by cloning (clones share the registry). Locking discipline itself is the
/// database's — this type orchestrates the retry/backoff policy around it.
#[derive(Clone)]
pub struct TransactionManager {
    pool: PgPool,
    active: Arc<DashMap<TransactionId, ActiveTransaction>>,
    next_id: Arc<AtomicU64>,
}

impl TransactionManager {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            active: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run `op` inside one transaction: begin, apply isolation/read-only
    /// options, execute, commit; roll back on any error. Transient failures
    /// are retried up to `retry_attempts` times after `retry_delay`, each
    /// attempt being an entirely new transaction. The optional timeout
    /// cancels `op` at its next await point and rolls back — best effort; a
    /// commit that already happened is not undone.
    pub async fn execute_transaction<T, F>(
        &self,
        op: F,
        options: &TransactionOptions,
    ) -> Result<T>
    where
        T: Send,
        F: for<'c> Fn(&'c mut PgConnection) -> TxFuture<'c, T> + Send + Sync,
    {
        let mut attempt = 0u32;
        loop {
            let (mut tx, id, _guard) = self.open(options).await?;
            let started = Instant::now();
            let outcome = Self::with_timeout(options.timeout, op(&mut *tx)).await;

            match self.finish(tx, id, started, outcome, options).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < options.retry_attempts => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_attempts = options.retry_attempts,
                        "transient transaction failure, retrying: {err}"
                    );
                    tokio::time::sleep(options.retry_delay_or_default()).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run every operation, in call order, inside one transaction. Any
    /// failure aborts the whole batch.
    pub async fn execute_batch_transaction<T>(
        &self,
        operations: Vec<TxOperation<T>>,
        options: &TransactionOptions,
    ) -> Result<Vec<T>>
    where
        T: Send,
    {
        let mut attempt = 0u32;
        loop {
            let (mut tx, id, _guard) = self.open(options).await?;
            let started = Instant::now();
            let body = async {
                let mut results = Vec::with_capacity(operations.len());
                for op in &operations {
                    results.push(op(&mut *tx).await?);
                }
                Ok(results)
            };
            let outcome = Self::with_timeout(options.timeout, Box::pin(body)).await;

            match self.finish(tx, id, started, outcome, options).await {
                Ok(results) => return Ok(results),
                Err(err) if err.is_transient() && attempt < options.retry_attempts => {
                    attempt += 1;
                    warn!(attempt, "transient batch failure, retrying: {err}");
                    tokio::time::sleep(options.retry_delay_or_default()).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Saga: run operations in order inside one transaction; when step *i*
    /// fails, execute the compensations registered for steps `0..i` in
    /// reverse order (best effort, failures logged and suppressed), then
    /// surface the original error. Compensations run on their own
    /// connections, outside the failing transaction.
    pub async fn execute_saga<T>(
        &self,
        operations: Vec<TxOperation<T>>,
        compensations: Vec<Arc<dyn CompensationAction>>,
        options: &TransactionOptions,
    ) -> Result<Vec<T>>
    where
        T: Send,
    {
        let (mut tx, id, _guard) = self.open(options).await?;
        let started = Instant::now();
        let pool = self.pool.clone();

        let body = async {
            let mut results = Vec::with_capacity(operations.len());
            for (index, op) in operations.iter().enumerate() {
                match op(&mut *tx).await {
                    Ok(value) => results.push(value),
                    Err(err) => {
                        let executed = index.min(compensations.len());
                        warn!(
                            failed_step = index,
                            compensating = executed,
                            "saga step failed: {err}"
                        );
                        run_compensations(&pool, &compensations[..executed]).await;
                        return Err(err);
                    }
                }
            }
            Ok(results)
        };
        let outcome = Self::with_timeout(options.timeout, Box::pin(body)).await;

        self.finish(tx, id, started, outcome, options).await
    }

    /// Partial rollback scope inside an already-open transaction. Issues a
    /// savepoint, runs `op`, releases it on success or rolls back to it on
    /// failure. Fails fast when no parent transaction is active.
    pub async fn execute_nested_transaction<T, F>(
        &self,
        conn: &mut PgConnection,
        op: F,
        savepoint_name: Option<&str>,
    ) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> TxFuture<'c, T> + Send,
    {
        let generated;
        let savepoint = match savepoint_name {
            Some(name) => name,
            None => {
                generated = format!("sp_{}", self.next_id.fetch_add(1, Ordering::Relaxed));
                &generated
            }
        };

        sqlx::query(&format!("SAVEPOINT {savepoint}"))
            .execute(&mut *conn)
            .await
            .map_err(map_savepoint_error)?;

        match op(&mut *conn).await {
            Ok(value) => {
                sqlx::query(&format!("RELEASE SAVEPOINT {savepoint}"))
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| CoreError::from_sqlx("failed to release savepoint", e))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) =
                    sqlx::query(&format!("ROLLBACK TO SAVEPOINT {savepoint}"))
                        .execute(&mut *conn)
                        .await
                {
                    error!(savepoint, "savepoint rollback failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Normal transaction semantics with the session set to read-only.
    pub async fn execute_read_only_transaction<T, F>(&self, op: F) -> Result<T>
    where
        T: Send,
        F: for<'c> Fn(&'c mut PgConnection) -> TxFuture<'c, T> + Send + Sync,
    {
        let options = TransactionOptions::new().read_only();
        self.execute_transaction(op, &options).await
    }

    /// Version-checked update. Fetches the row, runs `op`, then bumps the
    /// version column guarded by the version read at fetch time; when the
    /// guard misses (the row changed concurrently) the whole transaction is
    /// retried with linear backoff, up to `max_retries` attempts. Errors
    /// other than the version conflict propagate immediately.
    pub async fn execute_with_optimistic_locking<E, T, F>(
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
        let select = format!(
            "SELECT * FROM {} WHERE {} = $1",
            E::TABLE,
            E::ID_COLUMN
        );
        let bump = format!(
            "UPDATE {table} SET {ver} = {ver} + 1 WHERE {id_col} = $1 AND {ver} = $2",
            table = E::TABLE,
            ver = E::VERSION_COLUMN,
            id_col = E::ID_COLUMN
        );
        let options = TransactionOptions::new().label("optimistic update");

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let (mut tx, txid, _guard) = self.open(&options).await?;
            let started = Instant::now();

            let body = async {
                let entity = sqlx::query_as::<_, E>(&select)
                    .bind(id.clone())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| {
                        CoreError::from_sqlx("failed to fetch row for optimistic update", e)
                    })?
                    .ok_or_else(|| {
                        CoreError::NotFound(format!("{} {} not found", E::TABLE, id))
                    })?;
                let expected = entity.version();

                let value = op(entity, &mut *tx).await?;

                let update = sqlx::query(&bump)
                    .bind(id.clone())
                    .bind(expected)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| CoreError::from_sqlx("failed to bump row version", e))?;
                if update.rows_affected() == 0 {
                    return Err(CoreError::LockConflict(format!(
                        "{} {} version changed concurrently",
                        E::TABLE,
                        id
                    )));
                }
                Ok(value)
            };
            let outcome: Result<T> = body.await;

            match self.finish(tx, txid, started, outcome, &options).await {
                Err(CoreError::LockConflict(msg)) if attempt < max_retries => {
                    warn!(attempt, "optimistic lock conflict, retrying: {msg}");
                    tokio::time::sleep(OPTIMISTIC_BACKOFF_STEP * attempt).await;
                }
                Err(CoreError::LockConflict(_)) => {
                    return Err(CoreError::Transaction(format!(
                        "optimistic update of {} {} failed after {} attempts",
                        E::TABLE,
                        id,
                        max_retries
                    )));
                }
                other => return other,
            }
        }
    }

    /// Row-locked update: fetches the row under `FOR SHARE`/`FOR UPDATE` and
    /// holds the lock for the duration of the transaction while `op` runs.
    pub async fn execute_with_pessimistic_locking<E, T, F>(
        &self,
        id: &E::Id,
        op: F,
        mode: LockMode,
    ) -> Result<T>
    where
        E: Entity,
        T: Send,
        F: for<'c> Fn(E, &'c mut PgConnection) -> TxFuture<'c, T> + Send + Sync,
    {
        let select = format!(
            "SELECT * FROM {} WHERE {} = $1 {}",
            E::TABLE,
            E::ID_COLUMN,
            mode.row_lock_clause()
        );
        let options = TransactionOptions::new().label("pessimistic update");

        let (mut tx, txid, _guard) = self.open(&options).await?;
        let started = Instant::now();

        let body = async {
            let entity = sqlx::query_as::<_, E>(&select)
                .bind(id.clone())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| CoreError::from_sqlx("failed to acquire row lock", e))?
                .ok_or_else(|| CoreError::NotFound(format!("{} {} not found", E::TABLE, id)))?;

            op(entity, &mut *tx).await
        };
        let outcome: Result<T> = body.await;

        self.finish(tx, txid, started, outcome, &options).await
    }

    /// Chunked bulk processing: one transaction per chunk, sequential. Bounds
    /// transaction size at the cost of cross-chunk atomicity — a failure
    /// leaves earlier chunks committed.
    pub async fn execute_bulk_operation<I, F>(
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
        if chunk_size == 0 {
            return Err(CoreError::Configuration(
                "bulk operation chunk_size must be at least 1".to_string(),
            ));
        }

        for chunk in items.chunks(chunk_size) {
            let mut attempt = 0u32;
            loop {
                let (mut tx, id, _guard) = self.open(options).await?;
                let started = Instant::now();
                let outcome = Self::with_timeout(options.timeout, op(chunk, &mut *tx)).await;

                match self.finish(tx, id, started, outcome, options).await {
                    Ok(()) => break,
                    Err(err) if err.is_transient() && attempt < options.retry_attempts => {
                        attempt += 1;
                        warn!(attempt, "transient chunk failure, retrying: {err}");
                        tokio::time::sleep(options.retry_delay_or_default()).await;
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        Ok(())
    }

    /// Snapshot of every transaction currently in flight.
    pub fn active_transactions(&self) -> Vec<TransactionSnapshot> {
        self.active
            .iter()
            .map(|entry| TransactionSnapshot {
                id: *entry.key(),
                label: entry.value().label.clone(),
                started_at: entry.value().started_at,
                elapsed: entry.value().started.elapsed(),
            })
            .collect()
    }

    /// Transactions older than `threshold`. Diagnostic only; nothing is
    /// killed automatically.
    pub fn long_running_transactions(&self, threshold: Duration) -> Vec<TransactionSnapshot> {
        self.active_transactions()
            .into_iter()
            .filter(|snapshot| snapshot.elapsed >= threshold)
            .collect()
    }

    async fn open(
        &self,
        options: &TransactionOptions,
    ) -> Result<(sqlx::Transaction<'static, Postgres>, TransactionId, RegistryGuard)> {
        let id = TransactionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.active.insert(
            id,
            ActiveTransaction {
                label: options.label.clone(),
                started_at: Utc::now(),
                started: Instant::now(),
            },
        );
        let guard = RegistryGuard {
            active: Arc::clone(&self.active),
            id,
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::from_sqlx("failed to begin transaction", e))?;

        if let Some(level) = options.isolation_level {
            sqlx::query(level.set_statement())
                .execute(&mut *tx)
                .await
                .map_err(|e| CoreError::from_sqlx("failed to set isolation level", e))?;
        }
        if options.read_only {
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await
                .map_err(|e| CoreError::from_sqlx("failed to set read-only mode", e))?;
        }

        Ok((tx, id, guard))
    }

    async fn finish<T>(
        &self,
        tx: sqlx::Transaction<'static, Postgres>,
        id: TransactionId,
        started: Instant,
        outcome: Result<T>,
        options: &TransactionOptions,
    ) -> Result<T> {
        match outcome {
            Ok(value) => match tx.commit().await {
                Ok(()) => {
                    if let Some(hook) = &options.on_commit {
                        hook();
                    }
                    debug!(
                        transaction = %id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "transaction committed"
                    );
                    Ok(value)
                }
                Err(e) => {
                    let err = CoreError::from_sqlx("failed to commit transaction", e);
                    if let Some(hook) = &options.on_rollback {
                        hook(&err);
                    }
                    error!(transaction = %id, "commit failed: {err}");
                    Err(err)
                }
            },
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(transaction = %id, "rollback failed: {rollback_err}");
                }
                if let Some(hook) = &options.on_rollback {
                    hook(&err);
                }
                warn!(
                    transaction = %id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "transaction rolled back: {err}"
                );
                Err(err)
            }
        }
    }

    async fn with_timeout<T>(limit: Option<Duration>, fut: TxFuture<'_, T>) -> Result<T> {
        match limit {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(CoreError::Transaction(format!(
                    "transaction timed out after {}ms",
                    limit.as_millis()
                ))),
            },
            None => fut.await,
        }
    }

    #[cfg(test)]
    fn register_for_test(&self, label: &str, elapsed: Duration) -> TransactionId {
        let id = TransactionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.active.insert(
            id,
            ActiveTransaction {
                label: Some(label.to_string()),
                started_at: Utc::now(),
                started: Instant::now() - elapsed,
            },
        );
        id
    }
}

fn map_savepoint_error(e: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &e {
        // 25P01: no active SQL transaction.
        if db.code().as_deref() == Some("25P01") {
            return CoreError::Transaction(
                "nested transaction requires an active parent transaction".to_string(),
            );
        }
    }
    CoreError::from_sqlx("failed to create savepoint", e)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TransactionManager {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgresql://localhost/parish_ledger_test")
            .expect("lazy pool");
        TransactionManager::new(pool)
    }

    #[tokio::test]
    async fn fresh_manager_has_no_active_transactions() {
        assert!(manager().active_transactions().is_empty());
    }

    #[tokio::test]
    async fn transaction_ids_are_unique_and_display_with_prefix() {
        let m = manager();
        let a = m.register_for_test("a", Duration::ZERO);
        let b = m.register_for_test("b", Duration::ZERO);
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("tx_"));
    }

    #[tokio::test]
    async fn long_running_filter_uses_elapsed_time() {
        let m = manager();
        m.register_for_test("fast", Duration::ZERO);
        m.register_for_test("slow", Duration::from_secs(600));

        let long_running = m.long_running_transactions(Duration::from_secs(300));
        assert_eq!(long_running.len(), 1);
        assert_eq!(long_running[0].label.as_deref(), Some("slow"));
        assert_eq!(m.active_transactions().len(), 2);
    }

    #[tokio::test]
    async fn clones_share_the_registry() {
        let m = manager();
        let clone = m.clone();
        m.register_for_test("shared", Duration::ZERO);
        assert_eq!(clone.active_transactions().len(), 1);
    }
}

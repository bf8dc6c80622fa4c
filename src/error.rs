use thiserror::Error;

/// Crate-wide error type.
///
/// Every database-facing operation wraps the underlying sqlx failure with a
/// short operation-specific prefix via [`CoreError::from_sqlx`]. The wrapper
/// also classifies the failure: transient infrastructure errors (deadlocks,
/// serialization failures, dropped connections) land in [`CoreError::Transient`]
/// and are the only class the transaction retry machinery will re-run.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("transient database error: {0}")]
    Transient(String),
    #[error("optimistic lock conflict: {0}")]
    LockConflict(String),
    #[error("transaction error: {0}")]
    Transaction(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Wrap a sqlx error with an operation prefix, classifying transient
    /// failures so retry policies can distinguish them from permanent ones.
    pub fn from_sqlx(context: &str, err: sqlx::Error) -> Self {
        if is_transient(&err) {
            CoreError::Transient(format!("{context}: {err}"))
        } else {
            CoreError::Database(format!("{context}: {err}"))
        }
    }

    /// Whether a retry has any chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }
}

// Postgres classes worth retrying: serialization failure, deadlock detected,
// lock not available, admin shutdown. Everything else is permanent as far as
// this layer can tell.
const TRANSIENT_SQLSTATE: [&str; 4] = ["40001", "40P01", "55P03", "57P03"];

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| TRANSIENT_SQLSTATE.contains(&code.as_ref()))
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_transient() {
        let err = CoreError::from_sqlx("failed to fetch", sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
        assert!(err.to_string().contains("failed to fetch"));
    }

    #[test]
    fn row_not_found_is_permanent() {
        let err = CoreError::from_sqlx("failed to fetch", sqlx::Error::RowNotFound);
        assert!(!err.is_transient());
        assert!(matches!(err, CoreError::Database(_)));
    }

    #[test]
    fn lock_conflict_is_not_transient() {
        let err = CoreError::LockConflict("budgets 42 version changed".to_string());
        assert!(!err.is_transient());
    }
}

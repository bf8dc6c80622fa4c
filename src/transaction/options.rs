use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TransactionConfig;
use crate::error::CoreError;

/// Hook invoked after a successful commit.
pub type CommitHook = Arc<dyn Fn() + Send + Sync>;
/// Hook invoked after a rollback, with the error that caused it.
pub type RollbackHook = Arc<dyn Fn(&CoreError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn set_statement(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => {
                "SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED"
            }
            IsolationLevel::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            IsolationLevel::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            IsolationLevel::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

/// Row-lock flavor for pessimistic locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

impl LockMode {
    pub fn row_lock_clause(&self) -> &'static str {
        match self {
            LockMode::Read => "FOR SHARE",
            LockMode::Write => "FOR UPDATE",
        }
    }
}

/// Per-call transaction policy.
///
/// Retries apply only to transient failures (see [`CoreError::is_transient`]);
/// a retried transaction is a brand-new transaction, not a resumption. The
/// timeout cancels the caller's operation at its next await point and rolls
/// back — best effort: a statement that already committed is not undone.
#[derive(Clone, Default)]
pub struct TransactionOptions {
    pub isolation_level: Option<IsolationLevel>,
    pub read_only: bool,
    pub timeout: Option<Duration>,
    pub retry_attempts: u32,
    pub retry_delay: Option<Duration>,
    pub label: Option<String>,
    pub on_commit: Option<CommitHook>,
    pub on_rollback: Option<RollbackHook>,
}

pub(crate) const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &TransactionConfig) -> Self {
        Self {
            retry_attempts: config.retry_attempts,
            retry_delay: Some(Duration::from_millis(config.retry_delay_ms)),
            ..Self::default()
        }
    }

    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn on_commit<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_commit = Some(Arc::new(hook));
        self
    }

    pub fn on_rollback<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CoreError) + Send + Sync + 'static,
    {
        self.on_rollback = Some(Arc::new(hook));
        self
    }

    pub(crate) fn retry_delay_or_default(&self) -> Duration {
        self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY)
    }
}

impl fmt::Debug for TransactionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionOptions")
            .field("isolation_level", &self.isolation_level)
            .field("read_only", &self.read_only)
            .field("timeout", &self.timeout)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("label", &self.label)
            .field("on_commit", &self.on_commit.as_ref().map(|_| "<hook>"))
            .field("on_rollback", &self.on_rollback.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_do_not_retry() {
        let options = TransactionOptions::default();
        assert_eq!(options.retry_attempts, 0);
        assert_eq!(options.retry_delay_or_default(), DEFAULT_RETRY_DELAY);
        assert!(options.isolation_level.is_none());
        assert!(!options.read_only);
    }

    #[test]
    fn isolation_statements() {
        assert_eq!(
            IsolationLevel::Serializable.set_statement(),
            "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE"
        );
        assert_eq!(
            IsolationLevel::ReadCommitted.set_statement(),
            "SET TRANSACTION ISOLATION LEVEL READ COMMITTED"
        );
    }

    #[test]
    fn lock_mode_clauses() {
        assert_eq!(LockMode::Read.row_lock_clause(), "FOR SHARE");
        assert_eq!(LockMode::Write.row_lock_clause(), "FOR UPDATE");
    }

    #[test]
    fn builder_chain() {
        let options = TransactionOptions::new()
            .isolation(IsolationLevel::RepeatableRead)
            .retries(2)
            .retry_delay(Duration::from_millis(50))
            .label("budget approval");
        assert_eq!(options.retry_attempts, 2);
        assert_eq!(options.retry_delay, Some(Duration::from_millis(50)));
        assert_eq!(options.label.as_deref(), Some("budget approval"));
    }
}

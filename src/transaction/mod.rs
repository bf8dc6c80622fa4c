//! # Transaction Management
//!
//! Lifecycle and policy around multi-statement atomic units of work: retries
//! with backoff for transient failures, best-effort timeouts, saga-style
//! compensations, savepoint-based nesting, optimistic/pessimistic locking,
//! and chunked bulk processing.
//!
//! ## Key Components
//!
//! - [`manager`] - the [`TransactionManager`] and its operation surface
//! - [`options`] - per-call policy (isolation, retries, hooks, timeout)
//! - [`saga`] - the [`CompensationAction`] contract for multi-step undo
//!
//! Each transaction moves `created → active → (committed | rolled back)`;
//! both outcomes are terminal and a retried transaction is a brand-new
//! instance of that state machine. The manager tracks in-flight transactions
//! in a registry it exclusively owns, exposed read-only through
//! [`TransactionManager::active_transactions`].

pub mod manager;
pub mod options;
pub mod saga;

pub use manager::{
    TransactionId, TransactionManager, TransactionSnapshot, TxFuture, TxOperation,
};
pub use options::{CommitHook, IsolationLevel, LockMode, RollbackHook, TransactionOptions};
pub use saga::CompensationAction;

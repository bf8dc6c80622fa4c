#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Parish Ledger Core
//!
//! Data-access core for a parish youth organization's budgeting, event, and
//! settlement management system.
//!
//! ## Overview
//!
//! This crate is the persistence layer a domain service talks to: a generic
//! repository surface over PostgreSQL, a transaction manager with retry and
//! locking policy, and a query optimizer that instruments everything the
//! repositories execute. It is mechanism, not policy — business invariants
//! live in the database schema and the services above.
//!
//! ## Architecture
//!
//! Control flow runs controller → service → specialized repository →
//! [`repository::Repository`] → [`query::QueryOptimizer`] /
//! [`transaction::TransactionManager`] → sqlx → PostgreSQL.
//!
//! ## Module Organization
//!
//! - [`models`] - entity structs, status enums, insert payloads
//! - [`repository`] - generic CRUD surface and the user/event/budget repositories
//! - [`query`] - SQL builder, filter DSL, result cache, performance metrics
//! - [`transaction`] - transaction lifecycle, retries, sagas, locking helpers
//! - [`database`] - connection pool management
//! - [`config`] - environment-driven configuration
//! - [`error`] - structured error handling
//! - [`logging`] - tracing initialization
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parish_ledger::config::LedgerConfig;
//! use parish_ledger::database::DatabaseConnection;
//! use parish_ledger::repository::BudgetRepository;
//! use parish_ledger::transaction::TransactionManager;
//!
//! # async fn example() -> parish_ledger::Result<()> {
//! let config = LedgerConfig::from_env()?;
//! let db = DatabaseConnection::connect(&config.database).await?;
//!
//! let transactions = TransactionManager::new(db.pool().clone());
//! let budgets = BudgetRepository::new(db.pool(), &transactions);
//!
//! let pending = budgets.find_pending_approval(None).await?;
//! println!("{} budgets waiting for review", pending.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! All operations are async and interleave at database await points; no
//! application logic runs in parallel within one task. A transaction's
//! connection belongs exclusively to the callback that receives it, and the
//! manager's in-flight registry is the only shared mutable state in the
//! crate.

pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod query;
pub mod repository;
pub mod transaction;

pub use config::LedgerConfig;
pub use database::DatabaseConnection;
pub use error::{CoreError, Result};
pub use logging::init_logging;
pub use models::{Budget, Event, User};
pub use query::{
    Page, PageRequest, QueryBuilder, QueryOptimizationOptions, QueryOptimizer, WhereClause,
};
pub use repository::{
    BudgetRepository, ChangeSet, Entity, EventRepository, FindOptions, Repository, UserRepository,
};
pub use transaction::{
    CompensationAction, IsolationLevel, LockMode, TransactionManager, TransactionOptions,
};

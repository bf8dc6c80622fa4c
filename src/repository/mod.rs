//! # Repository Layer
//!
//! Uniform data access independent of the concrete entity type, plus the
//! domain repositories built on top of it.
//!
//! ## Key Components
//!
//! - [`entity`] - the trait set a type implements to become repository-managed
//!   ([`Entity`], [`SoftDeletable`], [`Versioned`], [`NewEntity`]) and the
//!   [`ChangeSet`] update payload
//! - [`base`] - the generic [`Repository`] CRUD/pagination/statistics surface
//! - [`users`] / [`events`] / [`budgets`] - entity-specific search, filter,
//!   and statistics queries
//!
//! Control flow: domain service → specialized repository → [`Repository`] →
//! query optimizer / transaction manager → sqlx → PostgreSQL. The layer is
//! mechanism, not policy — cross-entity invariants (expense totals,
//! approval-before-payment ordering) live in database constraints and the
//! specialized repositories' filters.

pub mod base;
pub mod budgets;
pub mod entity;
pub mod events;
pub mod users;

pub use base::{
    FieldStatistics, FindOptions, Repository, SortDirection, DEFAULT_BULK_CHUNK_SIZE,
};
pub use budgets::{BudgetRepository, BudgetSearchFilter, BudgetStatistics};
pub use entity::{ChangeSet, Entity, NewEntity, SoftDeletable, Versioned};
pub use events::{CalendarEvent, EventRepository, EventSearchFilter, EventStatistics};
pub use users::{RoleCount, UserRepository, UserSearchFilter, UserStatistics};

//! # Database Connection Management
//!
//! Pool construction and lifecycle for the PostgreSQL backend. Everything
//! above this module talks to the database through a [`sqlx::PgPool`] handed
//! out by [`DatabaseConnection`]; nothing else owns connection state.

pub mod connection;

pub use connection::DatabaseConnection;

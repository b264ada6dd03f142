//! Persistence adapters implementing the user store port.
//!
//! - `InMemoryUserPersistence`: tests and local development
//! - `PostgresUserPersistence`: production (sqlx + Postgres)

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryUserPersistence;
pub use postgres::PostgresUserPersistence;

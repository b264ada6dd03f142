//! Infrastructure layer: storage adapters and the notification transport.

pub mod event_bus;
pub mod persistence;


pub use persistence::{InMemoryUserPersistence, PostgresUserPersistence};

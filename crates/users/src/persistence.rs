//! Persistence port: the CRUD boundary the service calls into.
//!
//! Implemented by a relational store in production and by an in-memory
//! stand-in in tests/dev (both live in `userhub-infra`).

use async_trait::async_trait;
use thiserror::Error;

use userhub_core::{DomainError, UserId};

use crate::User;

/// Column covered by a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Username,
}

impl UniqueField {
    pub fn as_str(self) -> &'static str {
        match self {
            UniqueField::Email => "email",
            UniqueField::Username => "username",
        }
    }
}

/// Persistence operation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("user does not exist")]
    NotFound,

    /// A storage-level uniqueness constraint rejected the write.
    #[error("unique constraint violated on {}", .0.as_str())]
    Conflict(UniqueField),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<PersistenceError> for DomainError {
    fn from(value: PersistenceError) -> Self {
        match value {
            PersistenceError::NotFound => DomainError::NotFound,
            PersistenceError::Conflict(UniqueField::Email) => DomainError::UnavailableEmail,
            PersistenceError::Conflict(UniqueField::Username) => DomainError::UnavailableUsername,
            PersistenceError::Storage(msg) => DomainError::Storage(msg),
        }
    }
}

/// Abstract CRUD operations on the user store.
///
/// Implementations must:
/// - assign `id`, `created` and `modified` on `create`
/// - honour only `email`/`username` on `update` and assign a new `modified`
/// - enforce email and username uniqueness with a real constraint and report
///   violations as [`PersistenceError::Conflict`]
/// - report missing rows as [`PersistenceError::NotFound`]
#[async_trait]
pub trait UserPersistence: Send + Sync {
    async fn get(&self, id: UserId) -> Result<User, PersistenceError>;

    async fn get_all(&self) -> Result<Vec<User>, PersistenceError>;

    async fn create(&self, email: &str, username: Option<&str>) -> Result<User, PersistenceError>;

    async fn update(&self, user: &User) -> Result<User, PersistenceError>;

    /// Remove the row and return the removed id.
    async fn remove(&self, user: &User) -> Result<UserId, PersistenceError>;

    async fn email_available(&self, email: &str) -> Result<bool, PersistenceError>;

    async fn username_available(&self, username: &str) -> Result<bool, PersistenceError>;

    /// Cheap round trip proving the store can serve requests.
    async fn ping(&self) -> Result<(), PersistenceError>;
}

#[async_trait]
impl<P> UserPersistence for std::sync::Arc<P>
where
    P: UserPersistence + ?Sized,
{
    async fn get(&self, id: UserId) -> Result<User, PersistenceError> {
        (**self).get(id).await
    }

    async fn get_all(&self) -> Result<Vec<User>, PersistenceError> {
        (**self).get_all().await
    }

    async fn create(&self, email: &str, username: Option<&str>) -> Result<User, PersistenceError> {
        (**self).create(email, username).await
    }

    async fn update(&self, user: &User) -> Result<User, PersistenceError> {
        (**self).update(user).await
    }

    async fn remove(&self, user: &User) -> Result<UserId, PersistenceError> {
        (**self).remove(user).await
    }

    async fn email_available(&self, email: &str) -> Result<bool, PersistenceError> {
        (**self).email_available(email).await
    }

    async fn username_available(&self, username: &str) -> Result<bool, PersistenceError> {
        (**self).username_available(username).await
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        (**self).ping().await
    }
}

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use userhub_core::UserId;
use userhub_users::{PersistenceError, UniqueField, User, UserPersistence};

#[derive(Debug, Default)]
struct State {
    last_id: i64,
    users: BTreeMap<UserId, User>,
}

impl State {
    /// First unique field `email`/`username` would collide on, ignoring `except`.
    fn conflict(&self, email: &str, username: Option<&str>, except: Option<UserId>) -> Option<UniqueField> {
        let others = self.users.values().filter(|u| Some(u.id) != except);
        for user in others {
            if user.email == email {
                return Some(UniqueField::Email);
            }
            if username.is_some() && user.username.as_deref() == username {
                return Some(UniqueField::Username);
            }
        }
        None
    }
}

/// In-memory user store.
///
/// Intended for tests/dev. Enforces the same uniqueness rules as the
/// relational schema so late conflicts surface exactly as they would there.
#[derive(Debug, Default)]
pub struct InMemoryUserPersistence {
    state: RwLock<State>,
}

impl InMemoryUserPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.users.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, PersistenceError> {
        self.state.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, PersistenceError> {
        self.state.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> PersistenceError {
    PersistenceError::Storage("lock poisoned".to_string())
}

/// Wall clock, nudged forward when needed so `modified` strictly increases.
fn next_modified(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    let floor = previous + TimeDelta::microseconds(1);
    if now > floor { now } else { floor }
}

#[async_trait]
impl UserPersistence for InMemoryUserPersistence {
    async fn get(&self, id: UserId) -> Result<User, PersistenceError> {
        self.read()?.users.get(&id).cloned().ok_or(PersistenceError::NotFound)
    }

    async fn get_all(&self) -> Result<Vec<User>, PersistenceError> {
        Ok(self.read()?.users.values().cloned().collect())
    }

    async fn create(&self, email: &str, username: Option<&str>) -> Result<User, PersistenceError> {
        let mut state = self.write()?;
        if let Some(field) = state.conflict(email, username, None) {
            return Err(PersistenceError::Conflict(field));
        }

        let id = UserId::new(state.last_id + 1).map_err(|e| PersistenceError::Storage(e.to_string()))?;
        let now = Utc::now();
        let user = User {
            id,
            email: email.to_string(),
            username: username.map(str::to_string),
            created: now,
            modified: now,
        };

        state.last_id = id.get();
        state.users.insert(id, user.clone());
        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<User, PersistenceError> {
        let mut state = self.write()?;
        if !state.users.contains_key(&user.id) {
            return Err(PersistenceError::NotFound);
        }
        if let Some(field) = state.conflict(&user.email, user.username.as_deref(), Some(user.id)) {
            return Err(PersistenceError::Conflict(field));
        }

        let stored = state.users.get_mut(&user.id).ok_or(PersistenceError::NotFound)?;
        stored.email = user.email.clone();
        stored.username = user.username.clone();
        stored.modified = next_modified(stored.modified);
        Ok(stored.clone())
    }

    async fn remove(&self, user: &User) -> Result<UserId, PersistenceError> {
        self.write()?
            .users
            .remove(&user.id)
            .map(|removed| removed.id)
            .ok_or(PersistenceError::NotFound)
    }

    async fn email_available(&self, email: &str) -> Result<bool, PersistenceError> {
        Ok(!self.read()?.users.values().any(|u| u.email == email))
    }

    async fn username_available(&self, username: &str) -> Result<bool, PersistenceError> {
        Ok(!self
            .read()?
            .users
            .values()
            .any(|u| u.username.as_deref() == Some(username)))
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        self.read().map(|_| ())
    }
}

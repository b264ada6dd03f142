//! User operation service (application-level orchestration).
//!
//! Each operation is a short linear sequence: validation, then the gate, then
//! exactly one persistence write (or read). There is no intermediate persisted
//! state and no rollback: the first failure is returned to the caller.
//!
//! The service holds nothing but the persistence handle. The caller identity
//! is passed into every call, so one instance can serve concurrent requests
//! without any per-request state leaking between them.

use tracing::{debug, instrument, warn};

use userhub_auth::{AuthzError, IdentityContext, ListScope, authorize_target, list_scope};
use userhub_core::{DomainError, DomainResult, UserId};

use crate::validation::{validate_email, validate_username};
use crate::{User, UserPersistence};

#[derive(Debug, Clone)]
pub struct UserService<P> {
    persistence: P,
}

impl<P> UserService<P> {
    pub fn new(persistence: P) -> Self {
        Self { persistence }
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }
}

impl<P> UserService<P>
where
    P: UserPersistence,
{
    /// Register a new user.
    ///
    /// Does not require the USER role: registration is how a caller gets one.
    #[instrument(skip(self, identity, email, username), fields(caller_id = ?identity.caller_id()), err)]
    pub async fn create(
        &self,
        identity: &IdentityContext,
        email: &str,
        username: Option<&str>,
    ) -> DomainResult<User> {
        let email = validate_email(&self.persistence, email).await?;
        let username = validate_username(&self.persistence, username, false).await?;

        let user = self
            .persistence
            .create(email.as_str(), username.as_ref().map(|u| u.as_str()))
            .await?;

        debug!(user_id = %user.id, "user created");
        Ok(user)
    }

    /// Fetch one user; caller must own it or be an admin.
    #[instrument(skip(self, identity), fields(caller_id = ?identity.caller_id()), err)]
    pub async fn get(&self, identity: &IdentityContext, id: UserId) -> DomainResult<User> {
        self.retrieve(identity, id).await
    }

    /// List users: everything for admins, the caller's own record otherwise.
    ///
    /// A non-admin's list is always a singleton fetched by id; if that record
    /// is missing the call fails rather than returning an empty list.
    #[instrument(skip(self, identity), fields(caller_id = ?identity.caller_id()), err)]
    pub async fn get_all(&self, identity: &IdentityContext) -> DomainResult<Vec<User>> {
        match list_scope(identity).map_err(|e| denied(identity, e))? {
            ListScope::All => Ok(self.persistence.get_all().await?),
            ListScope::Own(caller) => Ok(vec![self.retrieve(identity, caller).await?]),
        }
    }

    #[instrument(skip(self, identity, email), fields(caller_id = ?identity.caller_id()), err)]
    pub async fn change_email(
        &self,
        identity: &IdentityContext,
        id: UserId,
        email: &str,
    ) -> DomainResult<User> {
        let email = validate_email(&self.persistence, email).await?;

        let mut user = self.retrieve(identity, id).await?;
        user.email = email.into_inner();

        Ok(self.persistence.update(&user).await?)
    }

    #[instrument(skip(self, identity, username), fields(caller_id = ?identity.caller_id()), err)]
    pub async fn change_username(
        &self,
        identity: &IdentityContext,
        id: UserId,
        username: Option<&str>,
    ) -> DomainResult<User> {
        let username = validate_username(&self.persistence, username, true)
            .await?
            .ok_or(DomainError::InvalidUsername)?;

        let mut user = self.retrieve(identity, id).await?;
        user.username = Some(username.into_inner());

        Ok(self.persistence.update(&user).await?)
    }

    /// Remove a user. `true` iff storage reports removing exactly that id.
    #[instrument(skip(self, identity), fields(caller_id = ?identity.caller_id()), err)]
    pub async fn remove(&self, identity: &IdentityContext, id: UserId) -> DomainResult<bool> {
        let user = self.retrieve(identity, id).await?;
        let removed = self.persistence.remove(&user).await?;
        Ok(removed == user.id)
    }

    /// Gate + fetch for every id-targeted operation.
    ///
    /// The gate runs before storage is touched, so a denied caller learns
    /// nothing about whether the target exists.
    async fn retrieve(&self, identity: &IdentityContext, id: UserId) -> DomainResult<User> {
        let access = authorize_target(identity, id).map_err(|e| denied(identity, e))?;
        debug!(target_id = %id, ?access, "access granted");

        Ok(self.persistence.get(id).await?)
    }
}

fn denied(identity: &IdentityContext, err: AuthzError) -> DomainError {
    warn!(
        caller_id = ?identity.caller_id(),
        reason = err.reason().as_str(),
        "access denied"
    );
    err.into()
}

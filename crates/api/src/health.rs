//! HTTP liveness/readiness endpoints.

use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, routing::get};
use tracing::warn;

use userhub_users::UserPersistence;

pub fn router<P>(persistence: Arc<P>) -> Router
where
    P: UserPersistence + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready::<P>))
        .with_state(persistence)
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Ready when the store answers a ping.
async fn ready<P>(State(persistence): State<Arc<P>>) -> StatusCode
where
    P: UserPersistence + 'static,
{
    match persistence.ping().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use userhub_core::UserId;
    use userhub_infra::InMemoryUserPersistence;
    use userhub_users::{PersistenceError, User};

    use super::*;

    /// Store whose data calls all fail; only `ping` can succeed.
    struct Stub {
        reachable: bool,
    }

    #[async_trait]
    impl UserPersistence for Stub {
        async fn get(&self, _id: UserId) -> Result<User, PersistenceError> {
            Err(down())
        }
        async fn get_all(&self) -> Result<Vec<User>, PersistenceError> {
            Err(down())
        }
        async fn create(&self, _email: &str, _username: Option<&str>) -> Result<User, PersistenceError> {
            Err(down())
        }
        async fn update(&self, _user: &User) -> Result<User, PersistenceError> {
            Err(down())
        }
        async fn remove(&self, _user: &User) -> Result<UserId, PersistenceError> {
            Err(down())
        }
        async fn email_available(&self, _email: &str) -> Result<bool, PersistenceError> {
            Err(down())
        }
        async fn username_available(&self, _username: &str) -> Result<bool, PersistenceError> {
            Err(down())
        }
        async fn ping(&self) -> Result<(), PersistenceError> {
            if self.reachable { Ok(()) } else { Err(down()) }
        }
    }

    fn down() -> PersistenceError {
        PersistenceError::Storage("connection refused".to_string())
    }

    async fn status(app: Router, path: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn healthy_store_is_ready() {
        let app = router(Arc::new(InMemoryUserPersistence::new()));
        assert_eq!(status(app.clone(), "/health").await, StatusCode::OK);
        assert_eq!(status(app, "/ready").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn unreachable_store_is_live_but_not_ready() {
        let app = router(Arc::new(Stub { reachable: false }));
        assert_eq!(status(app.clone(), "/health").await, StatusCode::OK);
        assert_eq!(status(app, "/ready").await, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn readiness_does_not_read_users() {
        let app = router(Arc::new(Stub { reachable: true }));
        assert_eq!(status(app, "/ready").await, StatusCode::OK);
    }
}

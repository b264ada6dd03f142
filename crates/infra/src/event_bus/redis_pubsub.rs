//! Redis pub/sub-backed notification bus (optional).
//!
//! Note: Redis pub/sub is not durable (messages are dropped while no
//! subscriber is connected). Notifications are advisory, so that is fine
//! here; storage stays the source of truth.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Mutex;
use std::thread;

use redis::{Commands, RedisError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use userhub_events::{EventBus, Subscription};

#[derive(Debug, Error)]
pub enum RedisBusError {
    #[error("redis error: {0}")]
    Redis(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("publisher lock poisoned")]
    Poisoned,
}

/// Redis pub/sub bus for JSON-encoded messages on a single channel.
///
/// Publishing reuses one blocking connection, opened on first use and
/// reopened after a failure.
pub struct RedisPubSubEventBus<M> {
    client: redis::Client,
    channel: String,
    publisher: Mutex<Option<redis::Connection>>,
    _message: PhantomData<fn() -> M>,
}

impl<M> fmt::Debug for RedisPubSubEventBus<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisPubSubEventBus")
            .field("client", &self.client)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// Clones share the client but open their own publishing connection.
impl<M> Clone for RedisPubSubEventBus<M> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            channel: self.channel.clone(),
            publisher: Mutex::new(None),
            _message: PhantomData,
        }
    }
}

impl<M> RedisPubSubEventBus<M> {
    pub fn new(redis_url: impl AsRef<str>, channel: impl Into<String>) -> Result<Self, RedisBusError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;
        Ok(Self {
            client,
            channel: channel.into(),
            publisher: Mutex::new(None),
            _message: PhantomData,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publish on the cached connection, retrying once on a fresh one when
    /// the cached connection turns out to be dead.
    fn publish_payload(&self, payload: &str) -> Result<i64, RedisBusError> {
        let mut slot = self.publisher.lock().map_err(|_| RedisBusError::Poisoned)?;

        match self.publish_once(&mut slot, payload) {
            Err(e) if e.is_connection_dropped() || e.is_io_error() => {
                debug!(channel = %self.channel, error = %e, "reconnecting publisher");
                self.publish_once(&mut slot, payload)
            }
            other => other,
        }
        .map_err(|e| RedisBusError::Redis(e.to_string()))
    }

    fn publish_once(&self, slot: &mut Option<redis::Connection>, payload: &str) -> Result<i64, RedisError> {
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self.client.get_connection()?,
        };

        let receivers: i64 = conn.publish(&self.channel, payload)?;
        *slot = Some(conn);
        Ok(receivers)
    }
}

impl<M> EventBus<M> for RedisPubSubEventBus<M>
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    type Error = RedisBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let payload = serde_json::to_string(&message)
            .map_err(|e| RedisBusError::Serialize(e.to_string()))?;

        let receivers = self.publish_payload(&payload)?;

        debug!(channel = %self.channel, receivers, "notification published");
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, subscription) = Subscription::channel();

        let client = self.client.clone();
        let channel = self.channel.clone();

        // Background thread that receives pub/sub messages and forwards them.
        thread::spawn(move || {
            let mut conn = match client.get_connection() {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "redis subscriber could not connect");
                    return;
                }
            };

            let mut pubsub = conn.as_pubsub();
            if pubsub.subscribe(&channel).is_err() {
                return;
            }

            loop {
                let msg = match pubsub.get_message() {
                    Ok(m) => m,
                    Err(_) => return,
                };

                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                let message: M = match serde_json::from_str(&payload) {
                    Ok(m) => m,
                    Err(e) => {
                        debug!(channel = %channel, error = %e, "skipping undecodable message");
                        continue;
                    }
                };

                if tx.send(message).is_err() {
                    return;
                }
            }
        });

        subscription
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    // Nothing listens on port 1.
    const UNREACHABLE: &str = "redis://127.0.0.1:1/";

    #[test]
    fn construction_does_not_connect() {
        let bus = RedisPubSubEventBus::<Value>::new(UNREACHABLE, "users").unwrap();
        assert_eq!(bus.channel(), "users");
        assert!(bus.publisher.lock().unwrap().is_none());
    }

    #[test]
    fn invalid_url_is_rejected() {
        let err = RedisPubSubEventBus::<Value>::new("not a url", "users").unwrap_err();
        assert!(matches!(err, RedisBusError::Redis(_)));
    }

    #[test]
    fn failed_publish_caches_nothing_and_can_be_retried() {
        let bus = RedisPubSubEventBus::<Value>::new(UNREACHABLE, "users").unwrap();

        for _ in 0..2 {
            let err = bus.publish(json!({ "cmd": "DELETED" })).unwrap_err();
            assert!(matches!(err, RedisBusError::Redis(_)));
            assert!(bus.publisher.lock().unwrap().is_none());
        }
    }
}

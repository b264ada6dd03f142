//! Wire envelopes for request/reply RPC and pub/sub notifications.
//!
//! Requests look like
//!
//! ```json
//! { "topic": "user", "cmd": "GET", "id": 1,
//!   "meta$": { "id": "req-1", "user": { "id": 1, "roles": ["USER"] } },
//!   "reply_to": "userhub:reply:..." }
//! ```
//!
//! The command-specific fields are flattened next to `topic`, so `C` is
//! normally an enum tagged by `cmd`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use userhub_auth::RequestMeta;
use userhub_core::ErrorKind;

/// Inbound request addressed to a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope<C> {
    pub topic: String,

    #[serde(flatten)]
    pub command: C,

    #[serde(rename = "meta$", default)]
    pub meta: RequestMeta,

    /// Channel the reply should be published on. Requests without it are
    /// handled but never answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl<C> RequestEnvelope<C> {
    pub fn new(topic: impl Into<String>, command: C, meta: RequestMeta) -> Self {
        Self {
            topic: topic.into(),
            command,
            meta,
            reply_to: None,
        }
    }

    pub fn reply_to(mut self, channel: impl Into<String>) -> Self {
        self.reply_to = Some(channel.into());
        self
    }
}

/// Error section of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyError {
    /// A core [`ErrorKind`] identifier, or `BAD_REQUEST` for messages the
    /// transport could not parse.
    pub kind: String,
    pub message: String,
}

impl ReplyError {
    pub const BAD_REQUEST: &'static str = "BAD_REQUEST";

    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            kind: Self::BAD_REQUEST.to_string(),
            message: message.into(),
        }
    }
}

/// Outbound reply: exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply<T> {
    pub request_id: String,
    pub result: Option<T>,
    pub error: Option<ReplyError>,
}

impl<T> Reply<T> {
    pub fn ok(request_id: impl Into<String>, result: T) -> Self {
        Self {
            request_id: request_id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(request_id: impl Into<String>, error: ReplyError) -> Self {
        Self {
            request_id: request_id.into(),
            result: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_kind(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.kind.as_str())
    }
}

/// Published notification (`pubsub$` fan-out, no reply expected).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEnvelope<P> {
    #[serde(rename = "pubsub$")]
    pub pubsub: bool,

    pub event_id: Uuid,
    pub topic: String,
    pub occurred_at: DateTime<Utc>,

    /// Metadata of the request that caused the notification.
    #[serde(rename = "meta$")]
    pub meta: RequestMeta,

    /// Notification body; carries the `cmd` tag when `P` is a tagged enum.
    #[serde(flatten)]
    pub payload: P,
}

impl<P> NotificationEnvelope<P> {
    pub fn new(topic: impl Into<String>, meta: RequestMeta, payload: P) -> Self {
        Self {
            pubsub: true,
            event_id: Uuid::now_v7(),
            topic: topic.into(),
            occurred_at: Utc::now(),
            meta,
            payload,
        }
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }
}

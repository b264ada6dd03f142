//! Transport adapter: wire message → service call → reply (+ notifications).
//!
//! The adapter owns everything transport-specific: parsing the envelope,
//! turning `meta$` into an identity, serializing results, and publishing
//! `CREATED` / `DELETED` after a committed write. The service never sees
//! raw JSON.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{Instrument, debug, info_span, warn};

use userhub_auth::{IdentityContext, RequestMeta};
use userhub_core::{DomainError, ErrorKind};
use userhub_events::{EventBus, NotificationEnvelope, Reply, ReplyError, RequestEnvelope};
use userhub_users::{DeletedUser, TOPIC, UserCommand, UserNotification, UserPersistence, UserService};

/// Notification type published by the adapter.
pub type UserNotificationEnvelope = NotificationEnvelope<UserNotification>;

/// Outcome of one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct HandledMessage {
    /// Where the reply goes; `None` means nobody is waiting for it.
    pub reply_to: Option<String>,
    pub reply: Reply<Value>,
}

pub struct UserRequestHandler<P, B> {
    service: UserService<P>,
    bus: Arc<B>,
}

impl<P, B> UserRequestHandler<P, B>
where
    P: UserPersistence,
    B: EventBus<UserNotificationEnvelope> + 'static,
{
    pub fn new(service: UserService<P>, bus: Arc<B>) -> Self {
        Self { service, bus }
    }

    pub fn service(&self) -> &UserService<P> {
        &self.service
    }

    /// Handle a raw JSON message as it arrives from the transport.
    ///
    /// Anything that is not a `user` request in a known command shape gets a
    /// `BAD_REQUEST` reply; the service is not invoked.
    pub async fn handle_message(&self, raw: &str) -> HandledMessage {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "message is not JSON");
                return HandledMessage {
                    reply_to: None,
                    reply: Reply::err("", ReplyError::bad_request(format!("invalid JSON: {e}"))),
                };
            }
        };

        // Read these leniently so malformed requests can still be answered.
        let reply_to = value.get("reply_to").and_then(Value::as_str).map(str::to_string);
        let request_id = value
            .get("meta$")
            .cloned()
            .and_then(|meta| serde_json::from_value::<RequestMeta>(meta).ok())
            .map(|meta| meta.id)
            .unwrap_or_default();

        match value.get("topic").and_then(Value::as_str) {
            Some(TOPIC) => {}
            other => {
                debug!(request_id = %request_id, topic = ?other, "unknown topic");
                return HandledMessage {
                    reply_to,
                    reply: Reply::err(
                        request_id,
                        ReplyError::bad_request(format!("unknown topic {other:?}")),
                    ),
                };
            }
        }

        let reply = match serde_json::from_value::<RequestEnvelope<UserCommand>>(value) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                debug!(request_id = %request_id, error = %e, "malformed command");
                Reply::err(request_id, ReplyError::bad_request(e.to_string()))
            }
        };

        HandledMessage { reply_to, reply }
    }

    /// Handle a parsed request.
    pub async fn handle(&self, request: RequestEnvelope<UserCommand>) -> Reply<Value> {
        let identity = IdentityContext::from(&request.meta);
        let request_id = request.meta.id.clone();

        let span = info_span!(
            "user_request",
            request_id = %request_id,
            cmd = request.command.name(),
            caller_id = ?identity.caller_id(),
        );

        let result = self.dispatch(&identity, &request).instrument(span).await;

        match result {
            Ok(value) => Reply::ok(request_id, value),
            Err(err) => {
                debug!(request_id = %request_id, kind = err.kind().as_str(), "request failed");
                Reply::err(request_id, ReplyError::from_kind(err.kind(), err.to_string()))
            }
        }
    }

    async fn dispatch(
        &self,
        identity: &IdentityContext,
        request: &RequestEnvelope<UserCommand>,
    ) -> Result<Value, DomainError> {
        match &request.command {
            UserCommand::Get { id } => to_value(&self.service.get(identity, *id).await?),

            UserCommand::Create { email, username } => {
                // An empty username is the same as none.
                let username = username.as_deref().filter(|u| !u.is_empty());
                let user = self.service.create(identity, email, username).await?;
                let value = to_value(&user)?;

                self.notify(request, UserNotification::Created { user }).await;
                Ok(value)
            }

            UserCommand::GetAll => to_value(&self.service.get_all(identity).await?),

            UserCommand::SetEmail { id, email } => {
                to_value(&self.service.change_email(identity, *id, email).await?)
            }

            UserCommand::SetUsername { id, username } => to_value(
                &self
                    .service
                    .change_username(identity, *id, Some(username.as_str()))
                    .await?,
            ),

            UserCommand::Delete { id } => {
                let removed = self.service.remove(identity, *id).await?;
                if removed {
                    let notification = UserNotification::Deleted {
                        user: DeletedUser { id: *id },
                    };
                    self.notify(request, notification).await;
                }
                to_value(&removed)
            }
        }
    }

    /// Publish a notification for a committed write.
    ///
    /// Failures are logged only: the write has already happened and the
    /// caller still gets its result.
    async fn notify(&self, request: &RequestEnvelope<UserCommand>, notification: UserNotification) {
        let envelope = NotificationEnvelope::new(TOPIC, request.meta.clone(), notification);
        let event_id = envelope.event_id;
        let bus = Arc::clone(&self.bus);

        // Bus publishing is blocking IO.
        match tokio::task::spawn_blocking(move || bus.publish(envelope)).await {
            Ok(Ok(())) => debug!(%event_id, "notification published"),
            Ok(Err(e)) => warn!(%event_id, error = ?e, "failed to publish notification"),
            Err(e) => warn!(%event_id, error = %e, "notification task failed"),
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, DomainError> {
    serde_json::to_value(value).map_err(|e| DomainError::storage(format!("failed to encode result: {e}")))
}

/// Whether the reply was produced before the message reached the service.
pub fn is_transport_error(reply: &Reply<Value>) -> bool {
    reply.error_kind() == Some(ReplyError::BAD_REQUEST)
}

/// Whether the reply reports a failure the core produced.
pub fn is_domain_error(reply: &Reply<Value>, kind: ErrorKind) -> bool {
    reply.error_kind() == Some(kind.as_str())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use userhub_events::{InMemoryEventBus, Subscription};
    use userhub_infra::InMemoryUserPersistence;

    use super::*;

    type Bus = InMemoryEventBus<UserNotificationEnvelope>;
    type Handler = UserRequestHandler<Arc<InMemoryUserPersistence>, Bus>;

    fn setup() -> (Handler, Subscription<UserNotificationEnvelope>) {
        let bus = Arc::new(Bus::new());
        let subscription = bus.subscribe();
        let handler = UserRequestHandler::new(
            UserService::new(Arc::new(InMemoryUserPersistence::new())),
            bus,
        );
        (handler, subscription)
    }

    fn request(body: Value, caller: Option<(i64, &str)>) -> String {
        let mut message = json!({ "topic": "user", "reply_to": "replies:1" });
        let mut meta = json!({ "id": "req-1" });
        if let Some((id, role)) = caller {
            meta["user"] = json!({ "id": id, "roles": [role] });
        }
        message["meta$"] = meta;
        for (k, v) in body.as_object().unwrap() {
            message[k] = v.clone();
        }
        message.to_string()
    }

    fn request_with_meta(body: Value, meta: Value) -> String {
        let mut message = json!({ "topic": "user", "reply_to": "replies:1", "meta$": meta });
        for (k, v) in body.as_object().unwrap() {
            message[k] = v.clone();
        }
        message.to_string()
    }

    async fn create(handler: &Handler, email: &str) -> i64 {
        let handled = handler
            .handle_message(&request(json!({ "cmd": "CREATE", "email": email }), None))
            .await;
        handled.reply.result.unwrap()["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn create_replies_with_user_and_publishes_created() {
        let (handler, subscription) = setup();

        let handled = handler
            .handle_message(&request(
                json!({ "cmd": "CREATE", "email": "ada@test.com", "username": "ada" }),
                Some((7, "USER")),
            ))
            .await;

        assert_eq!(handled.reply_to.as_deref(), Some("replies:1"));
        assert_eq!(handled.reply.request_id, "req-1");
        let user = handled.reply.result.unwrap();
        assert_eq!(user["email"], json!("ada@test.com"));
        assert_eq!(user["username"], json!("ada"));

        let notification = subscription.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(notification.pubsub);
        assert_eq!(notification.meta.id, "req-1");
        match notification.into_payload() {
            UserNotification::Created { user } => assert_eq!(user.email, "ada@test.com"),
            other => panic!("unexpected notification {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_username_on_create_is_treated_as_absent() {
        let (handler, _subscription) = setup();
        let handled = handler
            .handle_message(&request(
                json!({ "cmd": "CREATE", "email": "ada@test.com", "username": "" }),
                None,
            ))
            .await;

        assert!(handled.reply.is_ok());
        assert_eq!(handled.reply.result.unwrap()["username"], Value::Null);
    }

    #[tokio::test]
    async fn delete_publishes_deleted_with_id_only() {
        let (handler, subscription) = setup();
        let id = create(&handler, "gone@test.com").await;
        let _created = subscription.recv_timeout(Duration::from_secs(1)).unwrap();

        let handled = handler
            .handle_message(&request(json!({ "cmd": "DELETE", "id": id }), Some((id, "USER"))))
            .await;
        assert_eq!(handled.reply.result, Some(json!(true)));

        let notification = subscription.recv_timeout(Duration::from_secs(1)).unwrap();
        let wire = serde_json::to_value(&notification).unwrap();
        assert_eq!(wire["cmd"], json!("DELETED"));
        assert_eq!(wire["user"], json!({ "id": id }));
    }

    #[tokio::test]
    async fn failed_operations_publish_nothing() {
        let (handler, subscription) = setup();
        let id = create(&handler, "kept@test.com").await;
        let _created = subscription.recv_timeout(Duration::from_secs(1)).unwrap();

        let handled = handler
            .handle_message(&request(json!({ "cmd": "DELETE", "id": id }), Some((id + 1, "USER"))))
            .await;
        assert!(is_domain_error(&handled.reply, ErrorKind::MissingPermission));

        let handled = handler
            .handle_message(&request(json!({ "cmd": "CREATE", "email": "ab" }), None))
            .await;
        assert!(is_domain_error(&handled.reply, ErrorKind::InvalidEmail));

        assert!(subscription.try_recv().is_err());
    }

    #[tokio::test]
    async fn identity_comes_from_meta() {
        let (handler, _subscription) = setup();
        let id = create(&handler, "self@test.com").await;

        let anonymous = handler
            .handle_message(&request(json!({ "cmd": "GET", "id": id }), None))
            .await;
        assert!(is_domain_error(&anonymous.reply, ErrorKind::MissingPermission));

        let owner = handler
            .handle_message(&request(json!({ "cmd": "GET", "id": id }), Some((id, "USER"))))
            .await;
        assert_eq!(owner.reply.result.unwrap()["id"], json!(id));

        // Role strings are case-sensitive.
        let shouting = handler
            .handle_message(&request(json!({ "cmd": "GET", "id": id }), Some((id, "user"))))
            .await;
        assert!(is_domain_error(&shouting.reply, ErrorKind::MissingPermission));
    }

    #[tokio::test]
    async fn set_commands_and_get_all_round_trip() {
        let (handler, _subscription) = setup();
        let id = create(&handler, "first@test.com").await;
        let caller = Some((id, "USER"));

        let emailed = handler
            .handle_message(&request(json!({ "cmd": "SET.email", "id": id, "email": "second@test.com" }), caller))
            .await;
        assert_eq!(emailed.reply.result.unwrap()["email"], json!("second@test.com"));

        let renamed = handler
            .handle_message(&request(json!({ "cmd": "SET.username", "id": id, "username": "second" }), caller))
            .await;
        assert_eq!(renamed.reply.result.unwrap()["username"], json!("second"));

        let all = handler
            .handle_message(&request(json!({ "cmd": "GET.all" }), caller))
            .await;
        assert_eq!(all.reply.result.unwrap().as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_messages_are_bad_requests() {
        let (handler, _subscription) = setup();

        let not_json = handler.handle_message("{nope").await;
        assert!(is_transport_error(&not_json.reply));
        assert_eq!(not_json.reply_to, None);

        let wrong_topic = handler
            .handle_message(&json!({ "topic": "order", "cmd": "GET", "id": 1, "reply_to": "r" }).to_string())
            .await;
        assert!(is_transport_error(&wrong_topic.reply));
        assert_eq!(wrong_topic.reply_to.as_deref(), Some("r"));

        let unknown_cmd = handler
            .handle_message(&request(json!({ "cmd": "PATCH", "id": 1 }), None))
            .await;
        assert!(is_transport_error(&unknown_cmd.reply));
        assert_eq!(unknown_cmd.reply.request_id, "req-1");

        let missing_field = handler
            .handle_message(&request(json!({ "cmd": "SET.email", "id": 1 }), None))
            .await;
        assert!(is_transport_error(&missing_field.reply));
    }

    #[tokio::test]
    async fn loosely_typed_meta_is_not_a_bad_request() {
        let (handler, _subscription) = setup();

        let null_roles = handler
            .handle_message(&request_with_meta(
                json!({ "cmd": "CREATE", "email": "nullroles@test.com" }),
                json!({ "id": "req-1", "user": { "id": 22, "roles": null, "permissions": null } }),
            ))
            .await;
        assert!(null_roles.reply.is_ok());

        let string_caller = handler
            .handle_message(&request_with_meta(
                json!({ "cmd": "CREATE", "email": "stringid@test.com" }),
                json!({ "id": "req-2", "user": { "id": "22", "roles": ["USER"] } }),
            ))
            .await;
        assert!(string_caller.reply.is_ok());

        let numeric_request_id = handler
            .handle_message(&request_with_meta(
                json!({ "cmd": "CREATE", "email": "numeric@test.com" }),
                json!({ "id": 7 }),
            ))
            .await;
        assert!(numeric_request_id.reply.is_ok());
        assert_eq!(numeric_request_id.reply.request_id, "7");
    }

    #[tokio::test]
    async fn numeric_string_caller_id_owns_its_record() {
        let (handler, _subscription) = setup();
        let id = create(&handler, "owner@test.com").await;

        let handled = handler
            .handle_message(&request_with_meta(
                json!({ "cmd": "GET", "id": id }),
                json!({ "id": "req-1", "user": { "id": id.to_string(), "roles": ["USER"] } }),
            ))
            .await;
        assert_eq!(handled.reply.result.unwrap()["id"], json!(id));
    }

    #[tokio::test]
    async fn unreadable_caller_id_means_no_caller() {
        let (handler, _subscription) = setup();
        let id = create(&handler, "target@test.com").await;
        let meta = json!({ "id": "req-1", "user": { "id": "not-a-number", "roles": ["ADMIN"] } });

        let read = handler
            .handle_message(&request_with_meta(json!({ "cmd": "GET", "id": id }), meta.clone()))
            .await;
        assert!(is_domain_error(&read.reply, ErrorKind::MissingPermission));

        let created = handler
            .handle_message(&request_with_meta(
                json!({ "cmd": "CREATE", "email": "fresh@test.com" }),
                meta,
            ))
            .await;
        assert!(created.reply.is_ok());
    }
}

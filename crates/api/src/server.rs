//! Redis request/reply loop.
//!
//! Requests arrive as JSON on one pub/sub channel. Each is handled in its own
//! task; the reply is published on the channel named by the request's
//! `reply_to`.

use std::sync::Arc;

use redis::AsyncCommands;
use thiserror::Error;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use userhub_events::EventBus;
use userhub_users::UserPersistence;

use crate::adapter::{UserNotificationEnvelope, UserRequestHandler};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("request subscription on {0} closed")]
    SubscriptionClosed(String),
}

/// Subscribe to `request_channel` and serve requests until the subscription ends.
pub async fn run_rpc_loop<P, B>(
    handler: Arc<UserRequestHandler<P, B>>,
    client: redis::Client,
    request_channel: &str,
) -> Result<(), ServerError>
where
    P: UserPersistence + 'static,
    B: EventBus<UserNotificationEnvelope> + 'static,
{
    let replies = client.get_multiplexed_async_connection().await?;

    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(request_channel).await?;
    info!(channel = request_channel, "listening for requests");

    let mut messages = pubsub.on_message();
    while let Some(message) = messages.next().await {
        let payload: String = match message.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "skipping non-text message");
                continue;
            }
        };

        let handler = Arc::clone(&handler);
        let mut replies = replies.clone();
        tokio::spawn(async move {
            let handled = handler.handle_message(&payload).await;
            let Some(reply_to) = handled.reply_to else {
                return;
            };

            let body = match serde_json::to_string(&handled.reply) {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "failed to encode reply");
                    return;
                }
            };

            let sent: Result<i64, _> = replies.publish(&reply_to, body).await;
            if let Err(e) = sent {
                warn!(channel = %reply_to, error = %e, "failed to publish reply");
            }
        });
    }

    Err(ServerError::SubscriptionClosed(request_channel.to_string()))
}

//! Local consumer for notifications when no external bus is configured.

use tracing::info;

use userhub_events::Subscription;

use crate::UserNotificationEnvelope;

/// Log every notification on `subscription` until the bus goes away.
///
/// Blocking; run it on `spawn_blocking`. Returns how many were logged.
pub fn log_notifications(subscription: Subscription<UserNotificationEnvelope>) -> usize {
    let mut logged = 0;
    while let Ok(notification) = subscription.recv() {
        info!(
            event_id = %notification.event_id,
            request_id = %notification.meta.id,
            cmd = notification.payload().name(),
            user_id = %notification.payload().user_id(),
            "notification"
        );
        logged += 1;
    }
    logged
}

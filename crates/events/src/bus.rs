//! Notification publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes notifications (`CREATED`, `DELETED`) to whoever listens
//! after the user service has committed a write. It makes minimal assumptions:
//!
//! - **Transport-agnostic**: in-memory channels, Redis pub/sub, a broker, ...
//! - **Fire-and-forget**: the write is already committed when publication
//!   happens; a lost notification never rolls anything back
//! - **No persistence**: the bus is for distribution, storage is the source of truth

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError, channel};
use std::time::Duration;

/// Domain-agnostic pub/sub bus.
///
/// `publish()` can fail (lock poisoned, network error). Failures are surfaced
/// to the caller, which decides whether the failure matters; the transport
/// adapter only logs it because the triggering write already succeeded.
///
/// Implementations must be `Send + Sync`: concurrent request tasks publish
/// through one shared bus.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    /// Receive every message published from now on.
    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}

/// Receiving end of a bus subscription.
///
/// Blocking; consume it from a dedicated thread or `spawn_blocking`:
///
/// ```ignore
/// let subscription = bus.subscribe();
/// tokio::task::spawn_blocking(move || {
///     while let Ok(notification) = subscription.recv() {
///         audit_log.record(&notification);
///     }
/// });
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// A connected sender/subscription pair, for bus implementations.
    pub fn channel() -> (Sender<M>, Self) {
        let (tx, rx) = channel();
        (tx, Self::new(rx))
    }

    /// Block until the next message; errors once every sender is gone.
    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything already delivered, without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

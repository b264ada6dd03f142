//! Message-bus mechanics: pub/sub abstraction and wire envelopes.

pub mod bus;
pub mod envelope;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::{NotificationEnvelope, Reply, ReplyError, RequestEnvelope};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};

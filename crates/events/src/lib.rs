//! `facet-events`: the intercom.
//!
//! A small pub/sub layer shared by API modules and the host framework. Messages
//! are [`Envelope`]s addressed by a topic string (e.g. `"product:find"`); the
//! topic names are the wire contract, the payload is JSON.

pub mod bus;
pub mod envelope;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::Envelope;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};

/// The message type carried by the intercom.
pub type Message = Envelope<serde_json::Value>;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope for a message published on the intercom.
///
/// Notes:
/// - `topic` addresses the message; subscribers filter on it.
/// - `payload` is opaque to the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    message_id: Uuid,
    topic: String,
    occurred_at: DateTime<Utc>,
    payload: P,
}

impl<P> Envelope<P> {
    pub fn new(topic: impl Into<String>, payload: P) -> Self {
        Self {
            message_id: Uuid::now_v7(),
            topic: topic.into(),
            occurred_at: Utc::now(),
            payload,
        }
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    pub fn is(&self, topic: &str) -> bool {
        self.topic == topic
    }
}

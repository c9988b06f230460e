use facet_events::{Envelope, Message};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::command::{messages, topics};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveResult {
    pub matched: u64,
    pub removed: u64,
}

/// Successful outcome of a product operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductReply {
    /// `find` / `findOne`: one document or a list of documents.
    Data(Value),
    /// `create`: one stored record, or an array for batch input.
    Created(Value),
    Updated(UpdateResult),
    Removed(RemoveResult),
}

impl ProductReply {
    pub fn topic(&self) -> &'static str {
        match self {
            ProductReply::Data(_) => topics::DATA,
            ProductReply::Created(_) => topics::CREATED,
            ProductReply::Updated(_) => topics::UPDATED,
            ProductReply::Removed(_) => topics::REMOVED,
        }
    }

    /// Null, an empty list, or a write that touched nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            ProductReply::Data(v) | ProductReply::Created(v) => match v {
                Value::Null => true,
                Value::Array(items) => items.is_empty(),
                _ => false,
            },
            ProductReply::Updated(r) => r.matched == 0,
            ProductReply::Removed(r) => r.removed == 0,
        }
    }

    pub fn into_payload(self) -> Value {
        match self {
            ProductReply::Data(v) | ProductReply::Created(v) => v,
            ProductReply::Updated(r) => serde_json::to_value(r).unwrap_or_default(),
            ProductReply::Removed(r) => serde_json::to_value(r).unwrap_or_default(),
        }
    }
}

/// Failure published on `response:error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{status}: {message}")]
pub struct ErrorReply {
    pub status: u16,
    pub message: String,
}

impl ErrorReply {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn forbidden() -> Self {
        Self::new(403, messages::FORBIDDEN)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }
}

/// What every operation answers with.
pub type Reply = Result<ProductReply, ErrorReply>;

pub fn reply_topic(reply: &Reply) -> &'static str {
    match reply {
        Ok(r) => r.topic(),
        Err(_) => topics::ERROR,
    }
}

pub fn into_message(reply: Reply) -> Message {
    match reply {
        Ok(r) => Envelope::new(r.topic(), r.into_payload()),
        Err(e) => Envelope::new(topics::ERROR, serde_json::to_value(e).unwrap_or_default()),
    }
}

/// Decode a reply seen on the intercom. `None` for non-reply topics.
pub fn from_message(msg: &Message) -> Option<Reply> {
    let payload = msg.payload().clone();
    let reply = match msg.topic() {
        topics::DATA => Ok(ProductReply::Data(payload)),
        topics::CREATED => Ok(ProductReply::Created(payload)),
        topics::UPDATED => Ok(ProductReply::Updated(serde_json::from_value(payload).ok()?)),
        topics::REMOVED => Ok(ProductReply::Removed(serde_json::from_value(payload).ok()?)),
        topics::ERROR => Err(serde_json::from_value(payload).ok()?),
        _ => return None,
    };
    Some(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn emptiness_covers_null_lists_and_untouched_writes() {
        assert!(ProductReply::Data(Value::Null).is_empty());
        assert!(ProductReply::Data(json!([])).is_empty());
        assert!(!ProductReply::Data(json!({"_id": "a"})).is_empty());
        assert!(ProductReply::Updated(UpdateResult::default()).is_empty());
        assert!(
            !ProductReply::Updated(UpdateResult {
                matched: 1,
                modified: 0
            })
            .is_empty()
        );
        assert!(ProductReply::Removed(RemoveResult { matched: 2, removed: 0 }).is_empty());
    }

    #[test]
    fn errors_travel_on_the_error_topic() {
        let msg = into_message(Err(ErrorReply::forbidden()));
        assert_eq!(msg.topic(), topics::ERROR);
        assert_eq!(
            msg.payload(),
            &json!({"status": 403, "message": messages::FORBIDDEN})
        );
        assert_eq!(from_message(&msg), Some(Err(ErrorReply::forbidden())));
    }

    #[test]
    fn write_results_are_plain_counts() {
        let reply: Reply = Ok(ProductReply::Removed(RemoveResult { matched: 1, removed: 1 }));
        assert_eq!(reply_topic(&reply), topics::REMOVED);
        let msg = into_message(reply.clone());
        assert_eq!(msg.payload(), &json!({"matched": 1, "removed": 1}));
        assert_eq!(from_message(&msg), Some(reply));
    }

    #[test]
    fn commands_are_not_replies() {
        let msg: Message = Envelope::new(topics::FIND, Value::Null);
        assert_eq!(from_message(&msg), None);
    }
}

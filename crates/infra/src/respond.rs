//! Turning a store outcome into the single reply every operation emits.

use facet_events::{EventBus, Message};
use facet_products::{ErrorReply, ProductReply, Reply, into_message};

use crate::store::StoreError;

/// Map a store outcome to a reply.
///
/// - an empty result (null, `[]`, nothing affected) is a 404 with `not_found`
/// - a store error is a 404 with `error_prefix` + the error message
pub fn respond(
    outcome: Result<ProductReply, StoreError>,
    not_found: &str,
    error_prefix: &str,
) -> Reply {
    match outcome {
        Ok(reply) if reply.is_empty() => Err(ErrorReply::not_found(not_found)),
        Ok(reply) => Ok(reply),
        Err(e) => {
            match &e {
                StoreError::Backend(_) => tracing::error!(error = %e, "product store failure"),
                _ => tracing::warn!(error = %e, "product query rejected"),
            }
            Err(ErrorReply::not_found(format!("{error_prefix}{e}")))
        }
    }
}

/// Publish `reply` on the intercom. Publication failures are logged, not returned.
pub fn publish_reply<B>(bus: &B, reply: Reply)
where
    B: EventBus<Message> + ?Sized,
{
    let message = into_message(reply);
    let topic = message.topic().to_string();
    if let Err(e) = bus.publish(message) {
        tracing::error!(topic = %topic, error = %e, "failed to publish reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_events::{EventBus, InMemoryEventBus};
    use facet_products::{UpdateResult, topics};
    use serde_json::json;

    #[test]
    fn empty_results_are_not_found() {
        let reply = respond(Ok(ProductReply::Data(json!([]))), "nothing", "err: ");
        assert_eq!(reply, Err(ErrorReply::not_found("nothing")));

        let reply = respond(
            Ok(ProductReply::Updated(UpdateResult::default())),
            "nothing updated",
            "err: ",
        );
        assert_eq!(reply.unwrap_err().message, "nothing updated");
    }

    #[test]
    fn results_pass_through() {
        let reply = respond(Ok(ProductReply::Data(json!({"_id": "a"}))), "x", "y");
        assert_eq!(reply, Ok(ProductReply::Data(json!({"_id": "a"}))));
    }

    #[test]
    fn store_errors_are_prefixed() {
        let reply = respond(
            Err(StoreError::Query("Mod on _id not allowed".to_string())),
            "x",
            "Error updating product(s): ",
        );
        assert_eq!(
            reply,
            Err(ErrorReply::not_found(
                "Error updating product(s): Mod on _id not allowed"
            ))
        );
    }

    #[test]
    fn replies_are_published_on_their_topic() {
        let bus: InMemoryEventBus<Message> = InMemoryEventBus::new();
        let sub = bus.subscribe();
        publish_reply(&bus, Err(ErrorReply::forbidden()));
        publish_reply(&bus, Ok(ProductReply::Created(json!({"key": "tee"}))));

        let seen: Vec<_> = sub.drain().iter().map(|m| m.topic().to_string()).collect();
        assert_eq!(seen, vec![topics::ERROR, topics::CREATED]);
    }
}

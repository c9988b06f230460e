//! Typed commands for the five product operations.
//!
//! Topic strings stay the wire format; everything behind them is typed.

use facet_auth::Permission;
use facet_events::{Envelope, Message};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::{Conditions, Document, Projection, Query, QueryOptions, Updates};
use crate::reply::ErrorReply;

/// Intercom topic names.
pub mod topics {
    pub const FIND: &str = "product:find";
    pub const FIND_ONE: &str = "product:findone";
    pub const CREATE: &str = "product:create";
    pub const UPDATE: &str = "product:update";
    pub const REMOVE: &str = "product:remove";

    /// Every topic a product listener serves.
    pub const INBOUND: [&str; 5] = [FIND, FIND_ONE, CREATE, UPDATE, REMOVE];

    pub const DATA: &str = "response:product:data";
    pub const CREATED: &str = "response:product:create";
    pub const UPDATED: &str = "response:product:update";
    pub const REMOVED: &str = "response:product:remove";
    pub const ERROR: &str = "response:error";

    pub const CHECK_ACCESS: &str = "check:access";
}

/// Reply messages returned to callers verbatim.
pub mod messages {
    pub const NO_CONDITIONS: &str = "No query conditions were specified";
    pub const NO_UPDATES: &str = "No updates were specified";
    pub const NO_CREATE_DATA: &str = "No data supplied for creating new product.";
    pub const NO_REMOVE_CONDITIONS: &str = "No conditions specified for remove operation.";
    pub const FORBIDDEN: &str = "You do not have the privileges to perform this operation.";

    pub const FIND_NOT_FOUND: &str = "No products matched your criteria.";
    pub const FIND_ONE_NOT_FOUND: &str = "No product matched your criteria.";
    pub const CREATE_NOT_FOUND: &str = "No product was created based on your criteria.";
    pub const UPDATE_NOT_FOUND: &str = "No products were updated based on your criteria.";
    pub const REMOVE_NOT_FOUND: &str = "No product was removed based on your criteria.";

    pub const QUERY_ERROR_PREFIX: &str = "Error querying for product(s): ";
    pub const CREATE_ERROR_PREFIX: &str = "Error creating product(s): ";
    pub const UPDATE_ERROR_PREFIX: &str = "Error updating product(s): ";
    pub const REMOVE_ERROR_PREFIX: &str = "Error removing product(s): ";
}

/// Payload of `product:find` and `product:findone`.
///
/// `id` (find only) turns the lookup into a single fetch by `_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,
    pub fields: Projection,
    pub options: QueryOptions,
}

impl FindQuery {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn matching(conditions: Conditions) -> Self {
        Self {
            conditions: Some(conditions),
            ..Self::default()
        }
    }

    pub fn to_query(&self) -> Query {
        Query::new(
            self.conditions.clone().unwrap_or_default(),
            self.fields.clone(),
            self.options.clone(),
        )
    }
}

/// Payload of `product:update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateQuery {
    pub conditions: Option<Conditions>,
    pub updates: Option<Updates>,
    pub options: QueryOptions,
}

/// Payload of `product:create`: one record or an array of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreatePayload(pub Value);

impl CreatePayload {
    pub fn is_batch(&self) -> bool {
        self.0.is_array()
    }

    /// The records to insert, or `None` when there is nothing usable.
    pub fn records(&self) -> Option<Vec<Document>> {
        match &self.0 {
            Value::Object(map) if !map.is_empty() => Some(vec![map.clone()]),
            Value::Array(items) if !items.is_empty() => items
                .iter()
                .map(|item| item.as_object().cloned())
                .collect(),
            _ => None,
        }
    }
}

/// Payload of `product:remove`: the conditions object itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoveQuery {
    pub conditions: Option<Conditions>,
}

impl RemoveQuery {
    pub fn matching(conditions: Conditions) -> Self {
        Self {
            conditions: Some(conditions),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProductCommand {
    Find(FindQuery),
    FindOne(FindQuery),
    Create(CreatePayload),
    Update(UpdateQuery),
    Remove(RemoveQuery),
}

impl ProductCommand {
    pub fn topic(&self) -> &'static str {
        match self {
            ProductCommand::Find(_) => topics::FIND,
            ProductCommand::FindOne(_) => topics::FIND_ONE,
            ProductCommand::Create(_) => topics::CREATE,
            ProductCommand::Update(_) => topics::UPDATE,
            ProductCommand::Remove(_) => topics::REMOVE,
        }
    }

    pub fn permission(&self) -> Permission {
        Permission::from_static(match self {
            ProductCommand::Find(_) => "product.find",
            ProductCommand::FindOne(_) => "product.findone",
            ProductCommand::Create(_) => "product.create",
            ProductCommand::Update(_) => "product.update",
            ProductCommand::Remove(_) => "product.remove",
        })
    }

    pub fn success_topic(&self) -> &'static str {
        match self {
            ProductCommand::Find(_) | ProductCommand::FindOne(_) => topics::DATA,
            ProductCommand::Create(_) => topics::CREATED,
            ProductCommand::Update(_) => topics::UPDATED,
            ProductCommand::Remove(_) => topics::REMOVED,
        }
    }

    pub fn not_found_message(&self) -> &'static str {
        match self {
            ProductCommand::Find(_) => messages::FIND_NOT_FOUND,
            ProductCommand::FindOne(_) => messages::FIND_ONE_NOT_FOUND,
            ProductCommand::Create(_) => messages::CREATE_NOT_FOUND,
            ProductCommand::Update(_) => messages::UPDATE_NOT_FOUND,
            ProductCommand::Remove(_) => messages::REMOVE_NOT_FOUND,
        }
    }

    pub fn error_prefix(&self) -> &'static str {
        match self {
            ProductCommand::Find(_) | ProductCommand::FindOne(_) => messages::QUERY_ERROR_PREFIX,
            ProductCommand::Create(_) => messages::CREATE_ERROR_PREFIX,
            ProductCommand::Update(_) => messages::UPDATE_ERROR_PREFIX,
            ProductCommand::Remove(_) => messages::REMOVE_ERROR_PREFIX,
        }
    }

    /// Input-shape checks that run before access control and before any store call.
    pub fn validate(&self) -> Result<(), ErrorReply> {
        match self {
            ProductCommand::Find(_) => Ok(()),
            ProductCommand::FindOne(q) if q.conditions.is_none() => {
                Err(ErrorReply::bad_request(messages::NO_CONDITIONS))
            }
            ProductCommand::FindOne(_) => Ok(()),
            ProductCommand::Create(payload) if payload.records().is_none() => {
                Err(ErrorReply::bad_request(messages::NO_CREATE_DATA))
            }
            ProductCommand::Create(_) => Ok(()),
            ProductCommand::Update(q) if q.conditions.is_none() => {
                Err(ErrorReply::bad_request(messages::NO_CONDITIONS))
            }
            ProductCommand::Update(q) if q.updates.is_none() => {
                Err(ErrorReply::bad_request(messages::NO_UPDATES))
            }
            ProductCommand::Update(_) => Ok(()),
            ProductCommand::Remove(q) if q.conditions.is_none() => {
                Err(ErrorReply::bad_request(messages::NO_REMOVE_CONDITIONS))
            }
            ProductCommand::Remove(_) => Ok(()),
        }
    }

    /// Decode an inbound intercom message.
    ///
    /// `Ok(None)` for topics this module does not serve.
    pub fn decode(topic: &str, payload: Value) -> Result<Option<Self>, ErrorReply> {
        let malformed = |e: &dyn core::fmt::Display| {
            ErrorReply::bad_request(format!("Malformed payload for {topic}: {e}"))
        };

        let command = match topic {
            topics::FIND | topics::FIND_ONE => {
                let query = if payload.is_null() {
                    FindQuery::default()
                } else {
                    serde_json::from_value::<FindQuery>(payload).map_err(|e| malformed(&e))?
                };
                if topic == topics::FIND {
                    ProductCommand::Find(query)
                } else {
                    ProductCommand::FindOne(query)
                }
            }
            topics::CREATE => ProductCommand::Create(CreatePayload(payload)),
            topics::UPDATE => {
                let query = if payload.is_null() {
                    UpdateQuery::default()
                } else {
                    serde_json::from_value::<UpdateQuery>(payload).map_err(|e| malformed(&e))?
                };
                ProductCommand::Update(query)
            }
            topics::REMOVE => {
                let conditions = if payload.is_null() {
                    None
                } else {
                    Some(Conditions::try_from(payload).map_err(|e| malformed(&e))?)
                };
                ProductCommand::Remove(RemoveQuery { conditions })
            }
            _ => return Ok(None),
        };
        Ok(Some(command))
    }

    pub fn payload(&self) -> Value {
        let encoded = match self {
            ProductCommand::Find(q) | ProductCommand::FindOne(q) => serde_json::to_value(q),
            ProductCommand::Create(payload) => Ok(payload.0.clone()),
            ProductCommand::Update(q) => serde_json::to_value(q),
            ProductCommand::Remove(q) => Ok(q.conditions.clone().map(Value::from).unwrap_or_default()),
        };
        // Every payload type serializes to plain JSON.
        encoded.unwrap_or_default()
    }

    pub fn into_message(self) -> Message {
        Envelope::new(self.topic(), self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(topic: &str, payload: Value) -> ProductCommand {
        ProductCommand::decode(topic, payload).unwrap().unwrap()
    }

    #[test]
    fn null_find_payload_means_everything() {
        let cmd = decode(topics::FIND, Value::Null);
        assert_eq!(cmd, ProductCommand::Find(FindQuery::default()));
        assert!(cmd.validate().is_ok());
        assert!(
            matches!(&cmd, ProductCommand::Find(q) if q.to_query().conditions.is_empty())
        );
    }

    #[test]
    fn find_one_requires_conditions() {
        let err = decode(topics::FIND_ONE, json!({"fields": "key"}))
            .validate()
            .unwrap_err();
        assert_eq!(err, ErrorReply::bad_request(messages::NO_CONDITIONS));
    }

    #[test]
    fn update_requires_conditions_then_updates() {
        let err = decode(topics::UPDATE, json!({"updates": {"price": 1}}))
            .validate()
            .unwrap_err();
        assert_eq!(err.message, messages::NO_CONDITIONS);

        let err = decode(topics::UPDATE, json!({"conditions": {"key": "tee"}}))
            .validate()
            .unwrap_err();
        assert_eq!(err.message, messages::NO_UPDATES);
        assert_eq!(err.status, 400);
    }

    #[test]
    fn create_rejects_empty_or_non_object_records() {
        for payload in [Value::Null, json!({}), json!([]), json!([{"key": "a"}, 3]), json!("x")] {
            let err = decode(topics::CREATE, payload).validate().unwrap_err();
            assert_eq!(err.message, messages::NO_CREATE_DATA);
        }
        let batch = CreatePayload(json!([{"key": "a"}, {"key": "b"}]));
        assert!(batch.is_batch());
        assert_eq!(batch.records().map(|r| r.len()), Some(2));
    }

    #[test]
    fn remove_payload_is_the_conditions() {
        let cmd = decode(topics::REMOVE, json!({"key": "tee"}));
        assert!(cmd.validate().is_ok());
        assert_eq!(cmd.payload(), json!({"key": "tee"}));

        let err = decode(topics::REMOVE, Value::Null).validate().unwrap_err();
        assert_eq!(err.message, messages::NO_REMOVE_CONDITIONS);
    }

    #[test]
    fn other_topics_are_ignored() {
        assert_eq!(ProductCommand::decode("order:find", json!({})), Ok(None));
        assert_eq!(ProductCommand::decode(topics::DATA, json!([])), Ok(None));
    }

    #[test]
    fn malformed_payloads_are_bad_requests() {
        let err = ProductCommand::decode(topics::FIND, json!({"fields": "key -cost"})).unwrap_err();
        assert_eq!(err.status, 400);
        assert!(err.message.starts_with("Malformed payload for product:find: "));

        let err = ProductCommand::decode(topics::REMOVE, json!([1])).unwrap_err();
        assert!(err.message.starts_with("Malformed payload for product:remove: "));
    }

    #[test]
    fn commands_round_trip_through_the_wire() {
        let cmd = ProductCommand::Update(UpdateQuery {
            conditions: Some(Conditions::by_id("p1")),
            updates: Some(Updates::try_from(json!({"$inc": {"stock": 1}})).unwrap()),
            options: QueryOptions {
                multi: true,
                ..QueryOptions::default()
            },
        });
        let msg = cmd.clone().into_message();
        assert_eq!(msg.topic(), topics::UPDATE);
        let topic = msg.topic().to_string();
        let back = decode(&topic, msg.into_payload());
        assert_eq!(back, cmd);
    }

    #[test]
    fn permissions_follow_operation_names() {
        let cmd = decode(topics::FIND_ONE, json!({"conditions": {}}));
        assert_eq!(cmd.permission().as_str(), "product.findone");
        assert_eq!(cmd.success_topic(), topics::DATA);
        assert_eq!(cmd.error_prefix(), messages::QUERY_ERROR_PREFIX);
    }
}

//! Products domain module.
//!
//! The `Product` schema, the document query language used against the
//! `Product` collection, and the typed command/reply contract spoken on the
//! intercom. Pure logic only (no IO, no HTTP, no storage).

pub mod command;
pub mod query;
pub mod reply;
pub mod schema;

pub use command::{CreatePayload, FindQuery, ProductCommand, RemoveQuery, UpdateQuery, messages, topics};
pub use query::{Conditions, Document, Projection, Query, QueryError, QueryOptions, Sort, Updates};
pub use reply::{ErrorReply, ProductReply, RemoveResult, Reply, UpdateResult, from_message, into_message, reply_topic};
pub use schema::{FieldError, FieldErrorKind, Product, ProductType, SchemaError};

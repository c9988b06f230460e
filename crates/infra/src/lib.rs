//! Infrastructure layer: product storage and the intercom-facing dispatcher.

pub mod product_api;
pub mod respond;
pub mod store;

pub use product_api::{ListenError, ProductApi, ProductListener};
pub use respond::{publish_reply, respond};
pub use store::{InMemoryProductStore, ProductStore, StoreError};
#[cfg(feature = "postgres")]
pub use store::PostgresProductStore;

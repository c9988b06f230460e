//! HTTP API: the product route binder, bearer auth and process wiring.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;
pub mod middleware;

//! Product route binder.
//!
//! Each handler builds the same typed command the intercom carries and runs
//! it through the product dispatcher on behalf of the request principal.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::get,
};
use serde_json::{Map, Value};

use facet_products::{
    Conditions, CreatePayload, FindQuery, ProductCommand, Projection, QueryOptions, RemoveQuery,
    Sort, UpdateQuery, Updates,
};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(find_products).post(create_product))
        .route(
            "/:id",
            get(find_product).put(update_product).delete(remove_product),
        )
}

/// GET /products?key=tee&sort=-price&limit=10
///
/// Reserved parameters shape the query; every other parameter is an equality
/// condition, its value read as a JSON scalar when it parses as one.
pub async fn find_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    let query = match find_query_from_params(params) {
        Ok(q) => q,
        Err(message) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "bad_request", message);
        }
    };

    let reply = services
        .handle(&principal, ProductCommand::Find(query))
        .await;
    errors::reply_to_response(reply, StatusCode::OK)
}

/// GET /products/:id
pub async fn find_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let reply = services
        .handle(&principal, ProductCommand::Find(FindQuery::by_id(id)))
        .await;
    errors::reply_to_response(reply, StatusCode::OK)
}

/// POST /products (one record or an array of records)
pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let reply = services
        .handle(&principal, ProductCommand::Create(CreatePayload(body)))
        .await;
    errors::reply_to_response(reply, StatusCode::CREATED)
}

/// PUT /products/:id (body is the update document)
pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    let updates = match body {
        Value::Null => None,
        other => match Updates::try_from(other) {
            Ok(u) => Some(u),
            Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "bad_request", e.to_string()),
        },
    };

    let command = ProductCommand::Update(UpdateQuery {
        conditions: Some(Conditions::by_id(id)),
        updates,
        options: QueryOptions::default(),
    });
    let reply = services.handle(&principal, command).await;
    errors::reply_to_response(reply, StatusCode::OK)
}

/// DELETE /products/:id (soft delete)
pub async fn remove_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let command = ProductCommand::Remove(RemoveQuery::matching(Conditions::by_id(id)));
    let reply = services.handle(&principal, command).await;
    errors::reply_to_response(reply, StatusCode::OK)
}

fn find_query_from_params(params: HashMap<String, String>) -> Result<FindQuery, String> {
    let mut query = FindQuery::default();
    let mut conditions = Map::new();

    for (name, raw) in params {
        match name.as_str() {
            "fields" => {
                query.fields =
                    Projection::try_from(Value::String(raw)).map_err(|e| e.to_string())?;
            }
            "sort" => {
                query.options.sort = Sort::try_from(Value::String(raw)).map_err(|e| e.to_string())?;
            }
            "skip" => query.options.skip = Some(parse_param(&name, &raw)?),
            "limit" => query.options.limit = Some(parse_param(&name, &raw)?),
            "lean" => query.options.lean = parse_param(&name, &raw)?,
            "include_deleted" => query.options.include_deleted = parse_param(&name, &raw)?,
            _ => {
                conditions.insert(name, scalar(raw));
            }
        }
    }

    query.conditions = Some(Conditions::new(conditions));
    Ok(query)
}

fn parse_param<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, String> {
    raw.parse()
        .map_err(|_| format!("invalid value {raw:?} for query parameter `{name}`"))
}

/// `10` → number, `true` → bool, anything else stays a string.
fn scalar(raw: String) -> Value {
    match serde_json::from_str::<Value>(&raw) {
        Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => v,
        _ => Value::String(raw),
    }
}

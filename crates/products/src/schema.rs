//! The `Product` document schema.
//!
//! Documents arrive as loose JSON. [`Product::from_document`] casts every
//! field to its declared type, fills defaults and collects validation
//! failures; the messages are part of the API contract and are surfaced to
//! consumers verbatim.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use facet_core::{CategoryId, Entity, ProductId};

use crate::query::Document;

/// Validation messages for required fields.
pub mod messages {
    pub const KEY_REQUIRED: &str = "The key is required.";
    pub const LABEL_REQUIRED: &str = "The label field is required.";
    pub const PRODUCT_TYPE_REQUIRED: &str = "The product_type field is required.";
    pub const PRICE_REQUIRED: &str = "The price field is required.";
    pub const DESCRIPTION_REQUIRED: &str = "The description field is required.";
    /// Template for enum violations; `{VALUE}` and `{PATH}` are substituted.
    pub const ENUM_INVALID: &str = "`{VALUE}` is not a valid enum value for path `{PATH}`";
}

/// Lifetime of a product whose `active_until` is not given.
const DEFAULT_ACTIVE_DAYS: i64 = 365 * 100;

/// Product kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    #[default]
    Simple,
    Configurable,
    Bundle,
    Digital,
}

impl ProductType {
    pub const ALL: [ProductType; 4] = [
        ProductType::Simple,
        ProductType::Configurable,
        ProductType::Bundle,
        ProductType::Digital,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Simple => "simple",
            ProductType::Configurable => "configurable",
            ProductType::Bundle => "bundle",
            ProductType::Digital => "digital",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl core::fmt::Display for ProductType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    Required,
    Enum,
    Cast,
}

/// A single field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    fn required(path: &str, message: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: FieldErrorKind::Required,
            message: message.to_string(),
        }
    }

    fn invalid_enum(path: &str, value: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: FieldErrorKind::Enum,
            message: messages::ENUM_INVALID
                .replace("{VALUE}", value)
                .replace("{PATH}", path),
        }
    }

    fn cast(path: &str, ty: &str, value: &Value) -> Self {
        let shown = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            path: path.to_string(),
            kind: FieldErrorKind::Cast,
            message: format!("Cast to {ty} failed for value \"{shown}\" at path `{path}`"),
        }
    }
}

/// A document failed schema validation.
///
/// Errors are kept in schema field order; `Display` joins their messages with
/// a single space.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.message())]
pub struct SchemaError {
    pub errors: Vec<FieldError>,
}

impl SchemaError {
    pub fn message(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn field(&self, path: &str) -> Option<&FieldError> {
        self.errors.iter().find(|e| e.path == path)
    }
}

/// A catalog product.
///
/// `attributes`, `files` and `media` are free-form lists and `custom` is a
/// free-form map; their shape is owned by the storefront, not by this module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    #[serde(rename = "_id")]
    pub id: ProductId,
    pub key: String,
    pub label: String,
    pub product_type: ProductType,
    /// Component products of a bundle, in display order.
    pub products: Vec<ProductId>,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    pub description: String,
    pub visibility: Vec<String>,
    pub stock: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_backorder: Option<bool>,
    pub active_at: DateTime<Utc>,
    pub active_until: DateTime<Utc>,
    pub min_qty: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_qty: Option<i64>,
    pub attributes: Vec<Value>,
    pub files: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shippable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combineable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combineable_amount: Option<f64>,
    pub categories: Vec<CategoryId>,
    pub media: Vec<Value>,
    pub custom: Map<String, Value>,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    /// Soft-deletion marker; `None` while the product is live.
    pub date_deleted: Option<DateTime<Utc>>,
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn collection() -> &'static str {
        "Product"
    }
}

impl Product {
    /// Cast and validate a loose document into a product.
    ///
    /// Missing `_id` and timestamps are generated from `now`; unknown keys are
    /// dropped.
    pub fn from_document(doc: &Document, now: DateTime<Utc>) -> Result<Self, SchemaError> {
        let mut r = FieldReader::new(doc);

        let id = r.optional("_id", "ProductId", cast_id::<ProductId>);
        let key = r.required("key", "String", messages::KEY_REQUIRED, cast_string);
        let label = r.required("label", "String", messages::LABEL_REQUIRED, cast_string);
        let product_type = r.product_type();
        let products = r.list("products", cast_id::<ProductId>);
        let price = r.required("price", "Number", messages::PRICE_REQUIRED, cast_number);
        let cost = r.optional("cost", "Number", cast_number);
        let weight = r.optional("weight", "Number", cast_number);
        let sku = r.optional("sku", "String", cast_string);
        let short_description = r.optional("short_description", "String", cast_string);
        let description =
            r.required("description", "String", messages::DESCRIPTION_REQUIRED, cast_string);
        let visibility = r.list("visibility", cast_string);
        let stock = r.optional("stock", "Integer", cast_integer);
        let allow_backorder = r.optional("allow_backorder", "Boolean", cast_bool);
        let active_at = r.optional("active_at", "Date", cast_date);
        let active_until = r.optional("active_until", "Date", cast_date);
        let min_qty = r.optional("min_qty", "Integer", cast_integer);
        let max_qty = r.optional("max_qty", "Integer", cast_integer);
        let attributes = r.list("attributes", cast_mixed);
        let files = r.list("files", cast_mixed);
        let shippable = r.optional("shippable", "Boolean", cast_bool);
        let combineable = r.optional("combineable", "Boolean", cast_bool);
        let combineable_amount = r.optional("combineable_amount", "Number", cast_number);
        let categories = r.list("categories", cast_id::<CategoryId>);
        let media = r.list("media", cast_mixed);
        let custom = r.optional("custom", "Object", cast_object);
        let date_created = r.optional("date_created", "Date", cast_date);
        let date_modified = r.optional("date_modified", "Date", cast_date);
        let date_deleted = r.optional("date_deleted", "Date", cast_date);

        let errors = r.finish();
        let (Some(key), Some(label), Some(product_type), Some(price), Some(description)) =
            (key, label, product_type, price, description)
        else {
            return Err(SchemaError { errors });
        };
        if !errors.is_empty() {
            return Err(SchemaError { errors });
        }

        let active_at = active_at.unwrap_or(now);
        Ok(Self {
            id: id.unwrap_or_default(),
            key,
            label,
            product_type,
            products: products.unwrap_or_default(),
            price,
            cost,
            weight,
            sku,
            short_description,
            description,
            visibility: visibility
                .unwrap_or_else(|| vec!["search".to_string(), "catalog".to_string()]),
            stock: stock.unwrap_or(0),
            allow_backorder,
            active_at,
            active_until: active_until.unwrap_or(now + Duration::days(DEFAULT_ACTIVE_DAYS)),
            min_qty: min_qty.unwrap_or(1),
            max_qty,
            attributes: attributes.unwrap_or_else(|| vec![Value::Object(Map::new())]),
            files: files.unwrap_or_else(|| vec![Value::Object(Map::new())]),
            shippable,
            combineable,
            combineable_amount,
            categories: categories.unwrap_or_default(),
            media: media.unwrap_or_else(|| vec![Value::Object(Map::new())]),
            custom: custom.unwrap_or_default(),
            date_created: date_created.unwrap_or(now),
            date_modified: date_modified.unwrap_or(now),
            date_deleted,
        })
    }

    /// The product as a stored document.
    pub fn to_document(&self) -> Document {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Document::new(),
        }
    }
}

/// Walks a document field by field, collecting errors instead of stopping at
/// the first one.
struct FieldReader<'a> {
    doc: &'a Document,
    errors: Vec<FieldError>,
}

impl<'a> FieldReader<'a> {
    fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            errors: Vec::new(),
        }
    }

    fn finish(self) -> Vec<FieldError> {
        self.errors
    }

    /// Present and non-null.
    fn present(&self, path: &str) -> Option<&'a Value> {
        self.doc.get(path).filter(|v| !v.is_null())
    }

    fn cast<T>(&mut self, path: &str, ty: &str, value: &Value, f: fn(&Value) -> Option<T>) -> Option<T> {
        let out = f(value);
        if out.is_none() {
            self.errors.push(FieldError::cast(path, ty, value));
        }
        out
    }

    fn required<T>(
        &mut self,
        path: &str,
        ty: &str,
        message: &str,
        f: fn(&Value) -> Option<T>,
    ) -> Option<T> {
        match self.present(path) {
            Some(Value::String(s)) if s.is_empty() => {
                self.errors.push(FieldError::required(path, message));
                None
            }
            Some(v) => self.cast(path, ty, v, f),
            None => {
                self.errors.push(FieldError::required(path, message));
                None
            }
        }
    }

    fn optional<T>(&mut self, path: &str, ty: &str, f: fn(&Value) -> Option<T>) -> Option<T> {
        let v = self.present(path)?;
        self.cast(path, ty, v, f)
    }

    /// Array field; a lone scalar is treated as a one-element array.
    fn list<T>(&mut self, path: &str, f: fn(&Value) -> Option<T>) -> Option<Vec<T>> {
        let v = self.present(path)?;
        let items: Vec<&Value> = match v {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match f(item) {
                Some(x) => out.push(x),
                None => {
                    self.errors.push(FieldError::cast(path, "Array", v));
                    return None;
                }
            }
        }
        Some(out)
    }

    /// `product_type` defaults when absent but is required when explicitly blanked.
    fn product_type(&mut self) -> Option<ProductType> {
        const PATH: &str = "product_type";
        match self.doc.get(PATH) {
            None => Some(ProductType::default()),
            Some(Value::Null) => {
                self.errors
                    .push(FieldError::required(PATH, messages::PRODUCT_TYPE_REQUIRED));
                None
            }
            Some(Value::String(s)) if s.is_empty() => {
                self.errors
                    .push(FieldError::required(PATH, messages::PRODUCT_TYPE_REQUIRED));
                None
            }
            Some(Value::String(s)) => match ProductType::parse(s) {
                Some(t) => Some(t),
                None => {
                    self.errors.push(FieldError::invalid_enum(PATH, s));
                    None
                }
            },
            Some(other) => {
                self.errors.push(FieldError::cast(PATH, "String", other));
                None
            }
        }
    }
}

fn cast_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn cast_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn cast_integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && fits_i64(*f))
                    .map(|f| f as i64)
            }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn fits_i64(f: f64) -> bool {
    (i64::MIN as f64..i64::MAX as f64).contains(&f)
}

fn cast_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s == "true" => Some(true),
        Value::String(s) if s == "false" => Some(false),
        _ => None,
    }
}

fn cast_date(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn cast_id<T: core::str::FromStr>(v: &Value) -> Option<T> {
    v.as_str().and_then(|s| s.parse().ok())
}

fn cast_mixed(v: &Value) -> Option<Value> {
    Some(v.clone())
}

fn cast_object(v: &Value) -> Option<Map<String, Value>> {
    v.as_object().cloned()
}

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use facet_products::{ErrorReply, Reply};

/// Map a product reply to HTTP: `success` with the raw result, or the
/// reply's own status with an error body.
pub fn reply_to_response(reply: Reply, success: StatusCode) -> axum::response::Response {
    match reply {
        Ok(reply) => (success, axum::Json(reply.into_payload())).into_response(),
        Err(e) => error_reply_to_response(e),
    }
}

pub fn error_reply_to_response(err: ErrorReply) -> axum::response::Response {
    let status = StatusCode::from_u16(err.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let code = match status {
        StatusCode::BAD_REQUEST => "bad_request",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::NOT_FOUND => "not_found",
        _ => "error",
    };
    json_error(status, code, err.message)
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

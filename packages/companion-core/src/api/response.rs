//! Response helpers shared by the HTTP handlers.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Wraps a serializable value in a 200 JSON response.
pub fn api_success<T: Serialize>(body: T) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

/// Returns an XML document with a 200 status.
pub fn xml_ok(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Empty `<Response code="200" status="OK"/>` acknowledgement for commands.
pub fn xml_ack() -> Response {
    xml_ok(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response code="200" status="OK"/>"#.to_string(),
    )
}

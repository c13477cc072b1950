//! # Request ID Middleware
//!
//! Generates a unique request id for every inbound call, binds it to the
//! handler's async extent so any code inside the call (including pipeline
//! worker threads) can read it for log correlation, and echoes it back in
//! the `X-Request-ID` response header. The binding is scoped to the
//! handler future, so it is released on every exit path.

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

use tempest_core::context::{self, RequestId};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Attach a fresh request id to the call and the response.
pub async fn request_id(request: Request, next: Next) -> Response {
    let id = RequestId::new();
    let header_value = HeaderValue::from_str(id.as_str())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"));

    let mut response = context::scope(id, next.run(request)).await;
    response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    response
}

//! Liveness handler.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::{IntoResponse, Response},
};

/// Liveness path, matched case-insensitively.
pub const PING_PATH: &str = "/ping";

/// Whether `req` is a liveness probe: `GET /ping` in any letter case.
pub fn is_ping<B>(req: &Request<B>) -> bool {
    req.method() == Method::GET && req.uri().path().eq_ignore_ascii_case(PING_PATH)
}

/// Liveness response. Requires no credentials and touches no state.
pub fn ping() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from("PONG\n"),
    )
        .into_response()
}

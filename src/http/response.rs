use bytes::Bytes;
use http_body_util::Full;
use hyper::{StatusCode, header};

use super::Response;


pub(crate) fn service_unavailable() -> Response {
    plain(StatusCode::SERVICE_UNAVAILABLE, "Server error: service unavailable. Potentially try again later.")
}

pub(crate) fn bad_request(msg: Option<&str>) -> Response {
    plain(StatusCode::BAD_REQUEST, msg.unwrap_or("Bad request").to_owned())
}

pub(crate) fn internal_server_error() -> Response {
    plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

pub(crate) fn not_found() -> Response {
    plain(StatusCode::NOT_FOUND, "404 Not found")
}

pub(crate) fn method_not_allowed(allowed: &'static str) -> Response {
    let mut out = plain(StatusCode::METHOD_NOT_ALLOWED, "405 Method not allowed");
    out.headers_mut().insert(header::ALLOW, header::HeaderValue::from_static(allowed));
    out
}

pub(crate) fn json(body: Vec<u8>) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

pub(crate) fn html(body: String) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, "text/html; charset=UTF-8")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn plain(status: StatusCode, body: impl Into<Bytes>) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=UTF-8")
        .body(Full::new(body.into()))
        .unwrap()
}

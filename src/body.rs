use std::io;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};


/// The body type of every response produced by the gateway.
///
/// Script output and static files are streamed, and errors while reading
/// them surface as [`io::Error`]s that make hyper abort the response.
pub type GatewayBody = http_body_util::combinators::UnsyncBoxBody<Bytes, io::Error>;

/// Returns a body without data.
#[must_use]
pub fn empty() -> GatewayBody {
    Empty::new().map_err(|never| match never {}).boxed_unsync()
}

/// Returns a body consisting of `data`.
#[must_use]
pub fn full(data: impl Into<Bytes>) -> GatewayBody {
    Full::new(data.into()).map_err(|never| match never {}).boxed_unsync()
}

/// Builds a plain-text response generated by the gateway itself.
pub(crate) fn text(status: http::StatusCode, msg: &'static str) -> http::Response<GatewayBody> {
    let mut resp = http::Response::new(full(msg));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}

/// Builds an empty response with the given status.
pub(crate) fn status(status: http::StatusCode) -> http::Response<GatewayBody> {
    let mut resp = http::Response::new(empty());
    *resp.status_mut() = status;
    resp
}

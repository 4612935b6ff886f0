use std::io;
use std::path::Path;

use futures_util::TryStreamExt;
use http::{header, HeaderValue, Method, StatusCode};
use http_body_util::{BodyExt, StreamBody};
use httpdate::HttpDate;
use hyper::body::Frame;
use tokio_util::io::ReaderStream;

use crate::body::{self, GatewayBody};


const READ_BUF: usize = 64 * 1024;


/// Answers `req` with the file at `path`.
///
/// `path` must already be inside the document root. Only `GET` and `HEAD`
/// are allowed. A directory is answered with a redirect to the same URL
/// with a trailing `/`, so that relative links and the directory index
/// work.
pub async fn serve_file<B>(req: &http::Request<B>, path: &Path) -> http::Response<GatewayBody> {
    let head_only = match *req.method() {
        Method::GET => false,
        Method::HEAD => true,
        _ => {
            let mut resp = body::text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n");
            resp.headers_mut().insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
            return resp;
        },
    };

    let meta = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) => return open_failed(&e),
    };
    if meta.is_dir() {
        return redirect_to_dir(req.uri());
    }
    if !meta.is_file() {
        return body::text(StatusCode::NOT_FOUND, "not found\n");
    }

    let modified = meta.modified().ok().map(HttpDate::from);
    let mut resp = match modified.zip(if_modified_since(req)) {
        Some((modified, since)) if modified <= since => body::status(StatusCode::NOT_MODIFIED),
        _ if head_only => body::status(StatusCode::OK),
        _ => {
            let file = match tokio::fs::File::open(path).await {
                Ok(f) => f,
                Err(e) => return open_failed(&e),
            };
            let frames = ReaderStream::with_capacity(file, READ_BUF).map_ok(Frame::data);
            let mut resp = http::Response::new(StreamBody::new(frames).boxed_unsync());
            *resp.status_mut() = StatusCode::OK;
            resp
        },
    };

    let headers = resp.headers_mut();
    if let Some(modified) = modified {
        if let Ok(v) = HeaderValue::from_str(&modified.to_string()) {
            headers.insert(header::LAST_MODIFIED, v);
        }
    }
    if resp.status() == StatusCode::OK {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        if let Ok(v) = HeaderValue::from_str(mime.as_ref()) {
            resp.headers_mut().insert(header::CONTENT_TYPE, v);
        }
        resp.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from(meta.len()));
    }
    tracing::debug!(status = resp.status().as_u16(), len = meta.len(), "serving static file");
    resp
}

fn if_modified_since<B>(req: &http::Request<B>) -> Option<HttpDate> {
    req.headers().get(header::IF_MODIFIED_SINCE)?.to_str().ok()?.parse().ok()
}

fn open_failed(e: &io::Error) -> http::Response<GatewayBody> {
    let error: &dyn std::error::Error = e;
    if e.kind() == io::ErrorKind::PermissionDenied {
        tracing::info!(error, "static file not accessible");
        body::text(StatusCode::FORBIDDEN, "forbidden\n")
    } else {
        // Also covers a file name used as a directory
        tracing::debug!(error, "static file not found");
        body::text(StatusCode::NOT_FOUND, "not found\n")
    }
}

fn redirect_to_dir(uri: &http::Uri) -> http::Response<GatewayBody> {
    let location = match uri.query() {
        Some(q) => format!("{}/?{q}", uri.path()),
        None => format!("{}/", uri.path()),
    };
    let mut resp = body::text(StatusCode::MOVED_PERMANENTLY, "moved permanently\n");
    if let Ok(v) = HeaderValue::from_str(&location) {
        resp.headers_mut().insert(header::LOCATION, v);
    }
    resp
}

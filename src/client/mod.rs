use std::io;
use std::num::NonZeroU16;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::io::{AsyncRead, AsyncWrite};
use http::header;
use http_body_util::BodyExt;
use hyper::body::Body;

use crate::cgi::response::{parse_head, HeadError};
use crate::cgi::{self, OwnedVarName, Params};
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::mapper::path_bytes;
use crate::protocol::body::{BeginRequest, EndRequest};
use crate::protocol::record::{encode_stream, encode_stream_end};
use crate::protocol::{self as fcgi, ProtocolStatus, RecordType, RequestFlags, Role};
use crate::server::ConnectionInfo;

mod records;
mod response;

use records::RecordConn;
pub use response::Response;


/// A type-erased error, as produced by request bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that may occur while executing a FastCGI request.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Reading from or writing to the FastCGI connection failed.
    #[error("FastCGI connection failed: {0}")]
    Io(#[from] io::Error),
    /// A read or write on the FastCGI connection did not finish in time.
    #[error("FastCGI connection timed out after {0:?}")]
    Timeout(Duration),
    /// The application sent a record that cannot be decoded.
    #[error("invalid FastCGI record: {0}")]
    Protocol(#[from] fcgi::Error),
    /// The application's CGI response head is malformed.
    #[error(transparent)]
    Head(#[from] HeadError),
    /// Reading the HTTP request body failed.
    #[error("reading the request body failed: {0}")]
    Body(#[source] BoxError),
    /// The application refused the request.
    #[error("FastCGI application refused the request: {0:?}")]
    Rejected(ProtocolStatus),
    /// The application finished the request without a CGI response head.
    #[error("FastCGI application ended the request without a response head")]
    NoHead,
}


/// A FastCGI request under construction.
///
/// The parameters are derived from the HTTP request and can be modified
/// freely before the request is executed.
#[derive(Debug, Clone)]
pub struct Request {
    id: u16,
    params: Params,
}

impl Request {
    /// The FastCGI request ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u16 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Returns the parameters for modification.
    #[inline]
    pub fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }
}


/// A FastCGI client bound to a single connection.
///
/// The client runs a responder-role request without `FCGI_KEEP_CONN`, so
/// the application may close the connection once it is done. Executing a
/// request hands the connection over to the [`Response`].
pub struct Client<C> {
    conn: C,
    document_root: PathBuf,
    max_requests: NonZeroU16,
    next_id: u16,
    io_timeout: Duration,
    server_software: String,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl<C: AsyncRead + AsyncWrite + Unpin> Client<C> {
    /// Creates a client on `conn`.
    ///
    /// Request IDs cycle through `1..=max_requests`. `document_root` is
    /// reported to applications as `DOCUMENT_ROOT`.
    pub fn new(document_root: impl Into<PathBuf>, conn: C, max_requests: NonZeroU16) -> Self {
        Self {
            conn,
            document_root: document_root.into(),
            max_requests,
            next_id: 1,
            io_timeout: Duration::from_secs(60),
            server_software: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_owned(),
            diagnostics: Arc::new(TracingSink),
        }
    }

    /// Sets the deadline for every read and write on the connection.
    #[must_use]
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_server_software(mut self, software: impl Into<String>) -> Self {
        self.server_software = software.into();
        self
    }

    /// Sets the sink for `Stderr` output received before the response head.
    #[must_use]
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    /// Builds a request with the CGI/1.1 variables describing `parts`.
    ///
    /// Every request header becomes an `HTTP_*` variable, except for
    /// `Content-Type` and `Content-Length` (which map to `CONTENT_TYPE` and
    /// `CONTENT_LENGTH`), `Proxy`, and headers with `_` in their name.
    /// Repeated headers are joined with `, `, or `; ` for cookies.
    pub fn new_request(&mut self, parts: &http::request::Parts, info: &ConnectionInfo) -> Request {
        let id = self.next_id;
        self.next_id = if id >= self.max_requests.get() { 1 } else { id + 1 };

        let mut params = Params::new();
        params.insert(cgi::GATEWAY_INTERFACE, "CGI/1.1");
        params.insert(cgi::SERVER_SOFTWARE, &self.server_software);
        params.insert(cgi::SERVER_PROTOCOL, format!("{:?}", parts.version));
        params.insert(cgi::REQUEST_METHOD, parts.method.as_str());
        params.insert(cgi::REQUEST_URI, parts.uri.path_and_query().map_or("/", |pq| pq.as_str()));
        params.insert(cgi::QUERY_STRING, parts.uri.query().unwrap_or_default());
        params.insert(cgi::DOCUMENT_ROOT, path_bytes(&self.document_root));
        params.insert(cgi::REMOTE_ADDR, info.remote.ip().to_string());
        params.insert(cgi::REMOTE_PORT, info.remote.port().to_string());
        params.insert(cgi::SERVER_ADDR, info.local.ip().to_string());
        params.insert(cgi::SERVER_PORT, info.local.port().to_string());
        params.insert(cgi::SERVER_NAME, server_name(parts, info));
        params.insert(cgi::REDIRECT_STATUS, "200");
        params.insert(cgi::REQUEST_SCHEME, if info.secure { "https" } else { "http" });
        if info.secure {
            params.insert(cgi::HTTPS, "on");
        }

        for (name, value) in &parts.headers {
            if *name == header::CONTENT_TYPE {
                params.insert(cgi::CONTENT_TYPE, value);
            } else if *name == header::CONTENT_LENGTH {
                params.insert(cgi::CONTENT_LENGTH, value);
            } else if *name == "proxy" {
                // httpoxy: HTTP_PROXY would be mistaken for the proxy setting
                tracing::debug!("dropping Proxy request header");
            } else if let Some(var) = OwnedVarName::from_header(name) {
                let sep: &[u8] = if *name == header::COOKIE { b"; " } else { b", " };
                params.append(var, value, sep);
            } else {
                tracing::debug!(header = name.as_str(), "dropping request header with underscore");
            }
        }

        Request { id, params }
    }

    /// Sends `request` and `body` to the application and waits for the CGI
    /// response head.
    ///
    /// `Stderr` output received meanwhile goes to the client's diagnostic
    /// sink. The request body is streamed as-is, so the caller must make
    /// sure `CONTENT_LENGTH` matches it.
    ///
    /// # Errors
    /// Fails if the connection breaks or times out, the application sends
    /// invalid records or an invalid head, refuses the request, or ends it
    /// without a head. The connection is closed in all of these cases.
    pub async fn execute<B>(self, request: Request, mut body: B) -> Result<Response<C>, Error>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Into<BoxError>,
    {
        let Self { conn, io_timeout, diagnostics, .. } = self;
        let mut conn = RecordConn::new(conn, io_timeout);
        let id = request.id;

        let mut out = BytesMut::with_capacity(4096);
        let begin = BeginRequest { role: Role::Responder, flags: RequestFlags::empty() };
        out.extend_from_slice(&begin.to_record(id));
        let mut params = BytesMut::new();
        request.params.encode(&mut params)?;
        encode_stream(RecordType::Params, id, &params, &mut out);
        encode_stream_end(RecordType::Params, id, &mut out);
        conn.send(&out).await?;
        tracing::debug!(request_id = id, params = request.params.len(), "sent FastCGI request");

        let mut stdin_len: u64 = 0;
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| Error::Body(e.into()))?;
            let Ok(data) = frame.into_data() else { continue };
            if data.is_empty() {
                continue;
            }
            out.clear();
            encode_stream(RecordType::Stdin, id, &data, &mut out);
            conn.send(&out).await?;
            stdin_len += data.len() as u64;
        }
        out.clear();
        encode_stream_end(RecordType::Stdin, id, &mut out);
        conn.send(&out).await?;
        tracing::debug!(request_id = id, stdin_len, "sent FastCGI request body");

        let mut head_buf = BytesMut::new();
        loop {
            let Some(rec) = conn.next().await? else {
                return Err(Error::Io(io::ErrorKind::UnexpectedEof.into()));
            };
            if rec.header.request_id != id {
                tracing::debug!(rtype = ?rec.header.rtype, request_id = rec.header.request_id, "ignoring record for other request");
                continue;
            }

            match rec.header.rtype {
                RecordType::Stdout => {
                    head_buf.extend_from_slice(&rec.content);
                    if let Some((head, len)) = parse_head(&head_buf)? {
                        let body_start = head_buf.split_off(len).freeze();
                        return Ok(Response::new(head, body_start, conn, id, rec.is_stream_end()));
                    }
                    if rec.is_stream_end() {
                        return Err(Error::NoHead);
                    }
                },
                RecordType::Stderr => diagnostics.stderr(&rec.content),
                RecordType::EndRequest => {
                    let end = EndRequest::from_slice(&rec.content)?;
                    return Err(match end.protocol_status {
                        ProtocolStatus::RequestComplete => Error::NoHead,
                        status => Error::Rejected(status),
                    });
                },
                rtype => tracing::debug!(?rtype, "ignoring unexpected FastCGI record"),
            }
        }
    }
}

/// Returns the host name the request was addressed to, without the port.
fn server_name(parts: &http::request::Parts, info: &ConnectionInfo) -> String {
    let host = parts.headers.get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| parts.uri.host());
    match host {
        Some(host) if host.starts_with('[') => host.find(']').map_or(host, |i| &host[..=i]).to_owned(),
        Some(host) => host.rsplit_once(':').map_or(host, |(h, _)| h).to_owned(),
        None => info.local.ip().to_string(),
    }
}

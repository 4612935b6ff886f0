use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::io::{AsyncRead, AsyncWrite};
use futures_util::stream;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use tracing::Instrument;

use super::records::RecordConn;
use super::Error;
use crate::body::GatewayBody;
use crate::cgi::response::Head;
use crate::diagnostics::DiagnosticSink;
use crate::protocol::body::EndRequest;
use crate::protocol::{ProtocolStatus, RecordType};


/// The response of a FastCGI application whose CGI head has arrived.
///
/// The response owns the connection. It is closed when the response, or
/// the HTTP body created by [`Response::into_http`], is dropped.
#[derive(Debug)]
pub struct Response<C> {
    head: Head,
    body_start: Bytes,
    relay: Relay<C>,
}

impl<C> Response<C> {
    pub(super) fn new(head: Head, body_start: Bytes, conn: RecordConn<C>, request_id: u16, stdout_done: bool) -> Self {
        Self { head, body_start, relay: Relay { conn, request_id, stdout_done } }
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        self.head.status
    }

    #[inline]
    #[must_use]
    pub fn headers(&self) -> &http::HeaderMap {
        &self.head.headers
    }

    /// Closes the connection without reading the rest of the response.
    #[inline]
    pub fn close(self) {
        tracing::debug!(request_id = self.relay.request_id, "closing FastCGI connection early");
    }
}

impl<C: AsyncRead + AsyncWrite + Unpin + Send + 'static> Response<C> {
    /// Converts the response into an HTTP response streaming the remaining
    /// `Stdout` data.
    ///
    /// `Stderr` output goes to `diagnostics`. An error while streaming ends
    /// the body with an [`io::Error`] after logging it; the status line and
    /// headers have been sent by then.
    pub fn into_http(self, diagnostics: Arc<dyn DiagnosticSink>) -> http::Response<GatewayBody> {
        let Self { head, body_start, relay } = self;
        let span = tracing::Span::current();

        let first: Option<Result<_, io::Error>> = (!body_start.is_empty()).then(|| Ok(Frame::data(body_start)));
        let rest = stream::unfold(Some(relay), move |relay| {
            let diagnostics = Arc::clone(&diagnostics);
            async move {
                let mut relay = relay?;
                match relay.next_chunk(&*diagnostics).await {
                    Ok(Some(data)) => Some((Ok(Frame::data(data)), Some(relay))),
                    Ok(None) => None,
                    Err(e) => {
                        let error: &dyn std::error::Error = &e;
                        tracing::error!(error, request_id = relay.request_id, "relaying FastCGI response failed");
                        Some((Err(io::Error::other(e)), None))
                    },
                }
            }.instrument(span.clone())
        });

        let frames = futures_util::StreamExt::chain(stream::iter(first), rest);
        let mut resp = http::Response::new(StreamBody::new(frames).boxed_unsync());
        *resp.status_mut() = head.status;
        *resp.headers_mut() = head.headers;
        resp
    }
}


/// The receiving end of a FastCGI request after its response head.
#[derive(Debug)]
struct Relay<C> {
    conn: RecordConn<C>,
    request_id: u16,
    stdout_done: bool,
}

impl<C: AsyncRead + AsyncWrite + Unpin> Relay<C> {
    /// Returns the next piece of `Stdout` data, or `None` once the
    /// application ended the request.
    async fn next_chunk(&mut self, diagnostics: &dyn DiagnosticSink) -> Result<Option<Bytes>, Error> {
        loop {
            let Some(rec) = self.conn.next().await? else {
                // Some applications close right after the end of Stdout
                return if self.stdout_done {
                    Ok(None)
                } else {
                    Err(Error::Io(io::ErrorKind::UnexpectedEof.into()))
                };
            };
            if rec.header.request_id != self.request_id {
                continue;
            }

            match rec.header.rtype {
                RecordType::Stdout if rec.is_stream_end() => self.stdout_done = true,
                RecordType::Stdout => return Ok(Some(rec.content)),
                RecordType::Stderr => diagnostics.stderr(&rec.content),
                RecordType::EndRequest => {
                    let end = EndRequest::from_slice(&rec.content)?;
                    if end.protocol_status != ProtocolStatus::RequestComplete {
                        tracing::warn!(status = ?end.protocol_status, "FastCGI request ended abnormally");
                    }
                    tracing::debug!(app_status = end.app_status, "FastCGI request complete");
                    return Ok(None);
                },
                rtype => tracing::debug!(?rtype, "ignoring unexpected FastCGI record"),
            }
        }
    }
}

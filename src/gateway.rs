use std::sync::Arc;

use bytes::Bytes;
use http::{header, Method, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;

use crate::body::{self, GatewayBody};
use crate::cgi;
use crate::client::{BoxError, Client};
use crate::config::GatewayConfig;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::mapper::{self, ScriptTarget, Target};
use crate::server::ConnectionInfo;
use crate::static_files;
use crate::transport::{SocketTransport, Transport};


/// Answers HTTP requests by mapping them onto the document root and either
/// running the FastCGI application or serving a static file.
///
/// A gateway is immutable and shared by all connections.
pub struct Gateway<T = SocketTransport> {
    config: GatewayConfig,
    transport: T,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl Gateway {
    /// Creates a gateway that dials its FastCGI endpoint over sockets.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_transport(config, SocketTransport)
    }
}

impl<T: Transport> Gateway<T> {
    #[must_use]
    pub fn with_transport(config: GatewayConfig, transport: T) -> Self {
        Self { config, transport, diagnostics: Arc::new(TracingSink) }
    }

    /// Replaces the sink for `Stderr` output of the application, which
    /// defaults to [`TracingSink`].
    #[must_use]
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Answers one HTTP request.
    ///
    /// The [`ConnectionInfo`] extension of `req` supplies the client and
    /// server addresses. Failures are answered with an error status and
    /// logged: `400` for paths outside the document root, `413` for
    /// oversized bodies of unknown length and `502` if the application
    /// cannot be reached or fails before its response head.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<GatewayBody>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Into<BoxError>,
    {
        let info = req.extensions().get::<ConnectionInfo>().copied().unwrap_or_default();
        let target = match mapper::resolve(req.uri().path(), info.secure, &self.config) {
            Ok(t) => t,
            Err(e) => {
                let error: &dyn std::error::Error = &e;
                tracing::warn!(error, remote = %info.remote, "rejecting request");
                return body::text(StatusCode::BAD_REQUEST, "invalid url");
            },
        };

        match target {
            Target::Static(path) => {
                // Static files never read the body
                let (parts, _) = req.into_parts();
                static_files::serve_file(&http::Request::from_parts(parts, ()), &path).await
            },
            Target::Script(script) => self.run_script(req, &script, &info).await,
        }
    }

    async fn run_script<B>(&self, req: http::Request<B>, script: &ScriptTarget, info: &ConnectionInfo) -> http::Response<GatewayBody>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let body = match self.request_body(&parts, body).await {
            Ok(b) => b,
            Err(resp) => return resp,
        };

        let endpoint = self.config.endpoint();
        let limit = self.config.connect_timeout();
        let conn = match tokio::time::timeout(limit, self.transport.dial(endpoint)).await {
            Ok(Ok(c)) => c,
            Ok(Err(e)) => {
                let error: &dyn std::error::Error = &e;
                tracing::error!(error, %endpoint, "connecting to FastCGI application failed");
                return body::text(StatusCode::BAD_GATEWAY, "bad gateway");
            },
            Err(_) => {
                tracing::error!(%endpoint, timeout = ?limit, "connecting to FastCGI application timed out");
                return body::text(StatusCode::BAD_GATEWAY, "bad gateway");
            },
        };

        let mut client = Client::new(self.config.document_root(), conn, self.config.max_requests())
            .with_io_timeout(self.config.io_timeout())
            .with_server_software(self.config.server_software())
            .with_diagnostics(Arc::clone(&self.diagnostics));
        let mut request = client.new_request(&parts, info);
        script.apply(request.params_mut());
        tracing::debug!(script = script.script_name(), path_info = script.path_info(), "running script");

        let res = match body {
            RequestBody::Streamed(body) => client.execute(request, body).await,
            RequestBody::Buffered(data) => {
                if !data.is_empty() {
                    request.params_mut().insert(cgi::CONTENT_LENGTH, data.len().to_string());
                }
                client.execute(request, Full::new(data)).await
            },
        };
        let resp = match res {
            Ok(r) => r,
            Err(e) => {
                let error: &dyn std::error::Error = &e;
                tracing::error!(error, script = script.script_name(), "FastCGI request failed");
                return body::text(StatusCode::BAD_GATEWAY, "bad gateway");
            },
        };

        if parts.method == Method::HEAD {
            let mut head = body::status(resp.status());
            *head.headers_mut() = resp.headers().clone();
            resp.close();
            head
        } else {
            resp.into_http(Arc::clone(&self.diagnostics))
        }
    }

    /// Chooses how to forward the request body. Bodies of unknown length
    /// are read into memory so that `CONTENT_LENGTH` can be sent.
    async fn request_body<B>(&self, parts: &http::request::Parts, body: B) -> Result<RequestBody<B>, http::Response<GatewayBody>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        if parts.headers.contains_key(header::CONTENT_LENGTH) {
            return Ok(RequestBody::Streamed(body));
        }

        let max = self.config.max_buffered_body();
        match Limited::new(body, max).collect().await {
            Ok(collected) => Ok(RequestBody::Buffered(collected.to_bytes())),
            Err(e) if e.is::<LengthLimitError>() => {
                tracing::info!(limit = max, "request body too large");
                Err(body::text(StatusCode::PAYLOAD_TOO_LARGE, "payload too large"))
            },
            Err(e) => {
                let error: &dyn std::error::Error = &*e;
                tracing::info!(error, "reading request body failed");
                Err(body::text(StatusCode::BAD_REQUEST, "invalid request body"))
            },
        }
    }
}

impl<T> std::fmt::Debug for Gateway<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}


enum RequestBody<B> {
    Streamed(B),
    Buffered(Bytes),
}

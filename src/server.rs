use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::pin::pin;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::Instrument;

use crate::gateway::Gateway;
use crate::transport::Transport;

mod tracker;

use tracker::{ConnGuard, ConnTracker};


/// Addresses of the HTTP connection a request arrived on.
///
/// [`serve`] attaches this to every request as an extension. Requests
/// without it are treated as coming from `0.0.0.0:0` to `0.0.0.0:0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub remote: SocketAddr,
    pub local: SocketAddr,
    /// Whether the connection was made over TLS.
    pub secure: bool,
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        let unspecified = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        Self { remote: unspecified, local: unspecified, secure: false }
    }
}


/// Accepts HTTP/1 connections on `listener` and answers their requests
/// with `gateway` until `shutdown` resolves.
///
/// After `shutdown`, the listener is closed and open connections finish
/// their in-flight requests before this function returns.
///
/// # Errors
/// Fails only if the listener's local address is unavailable. Failed
/// accepts are logged and skipped.
pub async fn serve<T, F>(listener: TcpListener, gateway: Arc<Gateway<T>>, shutdown: F) -> io::Result<()>
where
    T: Transport,
    F: Future<Output = ()>,
{
    let local = listener.local_addr()?;
    tracing::info!(%local, fastcgi = %gateway.config().endpoint(), "gateway listening");

    let tracker = ConnTracker::new();
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut shutdown = pin!(shutdown);
    loop {
        let (stream, remote) = tokio::select! {
            biased;
            () = &mut shutdown => break,
            r = listener.accept() => match r {
                Ok(c) => c,
                Err(e) => {
                    let error: &dyn std::error::Error = &e;
                    tracing::info!(%local, error, "accept failed");
                    continue;
                },
            },
        };

        let info = ConnectionInfo { remote, local, secure: false };
        let span = tracing::error_span!("http_connection", %remote);
        let conn = serve_connection(stream, info, Arc::clone(&gateway), stop_rx.clone(), tracker.track());
        tokio::spawn(conn.instrument(span));
    }

    drop(listener);
    tracing::info!(active = tracker.active(), "waiting for open connections");
    stop_tx.send_replace(true);
    tracker.drained().await;
    Ok(())
}

async fn serve_connection<T: Transport>(
    stream: TcpStream,
    info: ConnectionInfo,
    gateway: Arc<Gateway<T>>,
    mut stop: watch::Receiver<bool>,
    _guard: ConnGuard,
) {
    tracing::debug!("connection accepted");
    let service = service_fn(move |mut req: http::Request<Incoming>| {
        let gateway = Arc::clone(&gateway);
        req.extensions_mut().insert(info);
        let span = tracing::info_span!("request", method = %req.method(), path = req.uri().path());
        async move { Ok::<_, Infallible>(gateway.handle(req).await) }.instrument(span)
    });

    let mut conn = pin!(http1::Builder::new().serve_connection(TokioIo::new(stream), service));
    let mut stopping = false;
    let res = loop {
        tokio::select! {
            r = conn.as_mut() => break r,
            _ = stop.changed(), if !stopping => {
                tracing::debug!("finishing connection for shutdown");
                conn.as_mut().graceful_shutdown();
                stopping = true;
            },
        }
    };

    match res {
        Ok(()) => tracing::debug!("connection closed"),
        Err(e) => {
            let error: &dyn std::error::Error = &e;
            tracing::debug!(error, "connection failed");
        },
    }
}

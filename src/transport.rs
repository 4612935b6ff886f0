use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::io::{AsyncRead, AsyncWrite};
use futures_util::FutureExt;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use crate::config::Endpoint;


/// Opens stream connections to a FastCGI application.
///
/// The gateway dials once per script request and owns the connection
/// until the response is finished, so implementations need not pool.
pub trait Transport: Send + Sync + 'static {
    /// The connection type. Dropping it closes the connection.
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Connects to `endpoint`.
    fn dial<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, io::Result<Self::Conn>>;
}


/// A [`Transport`] over TCP and Unix domain sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketTransport;

impl Transport for SocketTransport {
    type Conn = Compat<Socket>;

    fn dial<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, io::Result<Self::Conn>> {
        async move {
            let socket = match endpoint {
                Endpoint::Tcp(addr) => {
                    let stream = tokio::net::TcpStream::connect(addr.as_str()).await?;
                    // Params and Stdin are written as many small records
                    stream.set_nodelay(true)?;
                    Socket::Tcp(stream)
                },
                #[cfg(unix)]
                Endpoint::Unix(path) => Socket::Unix(tokio::net::UnixStream::connect(path).await?),
                #[cfg(not(unix))]
                Endpoint::Unix(_) => return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "unix sockets are not supported on this platform",
                )),
            };
            Ok(socket.compat())
        }.boxed()
    }
}


/// A connected TCP or Unix domain socket.
#[derive(Debug)]
pub enum Socket {
    #[allow(missing_docs)]
    Tcp(tokio::net::TcpStream),
    #[allow(missing_docs)]
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

macro_rules! dispatch {
    ($self:ident, $s:ident => $e:expr) => {
        match $self.get_mut() {
            Socket::Tcp($s) => $e,
            #[cfg(unix)]
            Socket::Unix($s) => $e,
        }
    };
}

impl tokio::io::AsyncRead for Socket {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut tokio::io::ReadBuf<'_>) -> Poll<io::Result<()>> {
        dispatch!(self, s => tokio::io::AsyncRead::poll_read(Pin::new(s), cx, buf))
    }
}

impl tokio::io::AsyncWrite for Socket {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        dispatch!(self, s => tokio::io::AsyncWrite::poll_write(Pin::new(s), cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        dispatch!(self, s => tokio::io::AsyncWrite::poll_flush(Pin::new(s), cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        dispatch!(self, s => tokio::io::AsyncWrite::poll_shutdown(Pin::new(s), cx))
    }
}

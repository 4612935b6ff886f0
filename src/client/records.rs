use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::Error;
use crate::protocol::record::{Record, RecordDecoder};


const READ_CHUNK: usize = 16 * 1024;


/// Runs an I/O future with a deadline.
pub(super) async fn deadline<T, F>(limit: Duration, fut: F) -> Result<T, Error>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res.map_err(Error::Io),
        Err(_) => Err(Error::Timeout(limit)),
    }
}


/// The FastCGI side of a gateway request: reads whole records from the
/// connection and writes encoded records to it.
#[derive(Debug)]
pub(super) struct RecordConn<C> {
    conn: C,
    buf: BytesMut,
    decoder: RecordDecoder,
    io_timeout: Duration,
}

impl<C: AsyncRead + AsyncWrite + Unpin> RecordConn<C> {
    pub(super) fn new(conn: C, io_timeout: Duration) -> Self {
        Self { conn, buf: BytesMut::with_capacity(READ_CHUNK), decoder: RecordDecoder::new(), io_timeout }
    }

    /// Writes pre-encoded records and flushes them.
    pub(super) async fn send(&mut self, records: &[u8]) -> Result<(), Error> {
        let conn = &mut self.conn;
        deadline(self.io_timeout, async move {
            conn.write_all(records).await?;
            conn.flush().await
        }).await
    }

    /// Returns the next record, or `None` if the application closed the
    /// connection at a record boundary.
    ///
    /// # Errors
    /// Fails on I/O errors, timeouts, undecodable records, and connections
    /// closed in the middle of a record.
    pub(super) async fn next(&mut self) -> Result<Option<Record>, Error> {
        loop {
            if let Some(rec) = self.decoder.decode(&mut self.buf)? {
                return Ok(Some(rec));
            }

            let start = self.buf.len();
            self.buf.resize(start + READ_CHUNK, 0);
            let read = deadline(self.io_timeout, self.conn.read(&mut self.buf[start..])).await;
            let n = match read {
                Ok(n) => n,
                Err(e) => {
                    self.buf.truncate(start);
                    return Err(e);
                },
            };
            self.buf.truncate(start + n);

            if n == 0 {
                return if self.buf.is_empty() && !self.decoder.is_mid_record() {
                    Ok(None)
                } else {
                    Err(Error::Io(io::ErrorKind::UnexpectedEof.into()))
                };
            }
        }
    }
}

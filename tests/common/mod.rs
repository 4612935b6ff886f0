#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http_body_util::{BodyExt, Full};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use fastcgi_gateway::body::GatewayBody;
use fastcgi_gateway::protocol::body::EndRequest;
use fastcgi_gateway::protocol::nv::NVIter;
use fastcgi_gateway::protocol::record::{encode_stream, encode_stream_end, Record, RecordDecoder};
use fastcgi_gateway::protocol::{ProtocolStatus, RecordType};
use fastcgi_gateway::{ConnectionInfo, Endpoint, Gateway, GatewayConfig, NullSink, Transport};


/// How the fake application answers a request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Sends this as `Stdout`, followed by a successful `EndRequest`.
    Output(&'static [u8]),
    /// Sends bytes that are not FastCGI records.
    Garbage,
    /// Closes the connection without answering.
    Hangup,
    /// Ends the request with the given protocol status.
    Reject(ProtocolStatus),
}

/// A request as received by the fake application.
#[derive(Debug, Clone, Default)]
pub struct Seen {
    pub params: BTreeMap<String, String>,
    pub stdin: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct Stats {
    pub dials: AtomicUsize,
    pub closed: AtomicUsize,
    pub seen: Mutex<Vec<Seen>>,
}

impl Stats {
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Seen {
        self.seen.lock().expect("lock").last().cloned().expect("a request reached the application")
    }

    /// Waits until the gateway closed `n` connections.
    pub async fn wait_closed(&self, n: usize) {
        let closed = async {
            while self.closed.load(Ordering::SeqCst) < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), closed).await
            .expect("connection was not closed");
    }
}


/// A [`Transport`] connecting to an in-process FastCGI application over
/// a pipe.
#[derive(Debug, Clone)]
pub struct FakeApp {
    reply: Reply,
    refuse: bool,
    pub stats: Arc<Stats>,
}

impl FakeApp {
    pub fn new(reply: Reply) -> Self {
        Self { reply, refuse: false, stats: Arc::default() }
    }

    pub fn refusing() -> Self {
        Self { refuse: true, ..Self::new(Reply::Hangup) }
    }
}

impl Transport for FakeApp {
    type Conn = Compat<DuplexStream>;

    fn dial<'a>(&'a self, _endpoint: &'a Endpoint) -> BoxFuture<'a, io::Result<Self::Conn>> {
        async move {
            if self.refuse {
                return Err(io::ErrorKind::ConnectionRefused.into());
            }
            self.stats.dials.fetch_add(1, Ordering::SeqCst);
            let (client, server) = tokio::io::duplex(64 * 1024);
            tokio::spawn(run_app(server, self.reply.clone(), Arc::clone(&self.stats)));
            Ok(client.compat())
        }.boxed()
    }
}

async fn next_record(conn: &mut DuplexStream, buf: &mut BytesMut, decoder: &mut RecordDecoder) -> Option<Record> {
    loop {
        if let Some(rec) = decoder.decode(buf).ok()? {
            return Some(rec);
        }
        if conn.read_buf(buf).await.ok()? == 0 {
            return None;
        }
    }
}

async fn run_app(mut conn: DuplexStream, reply: Reply, stats: Arc<Stats>) {
    let mut buf = BytesMut::new();
    let mut decoder = RecordDecoder::new();
    let (mut params, mut seen) = (Vec::new(), Seen::default());
    let mut id = 0;

    while let Some(rec) = next_record(&mut conn, &mut buf, &mut decoder).await {
        id = rec.header.request_id;
        match rec.header.rtype {
            RecordType::Params => params.extend_from_slice(&rec.content),
            RecordType::Stdin if rec.is_stream_end() => break,
            RecordType::Stdin => seen.stdin.extend_from_slice(&rec.content),
            _ => {},
        }
    }
    seen.params = NVIter::new(&params)
        .map(|(n, v)| (String::from_utf8_lossy(n).into_owned(), String::from_utf8_lossy(v).into_owned()))
        .collect();
    stats.seen.lock().expect("lock").push(seen);

    let mut out = BytesMut::new();
    let end = |status| EndRequest { app_status: 0, protocol_status: status }.to_bytes();
    match reply {
        Reply::Output(stdout) => {
            encode_stream(RecordType::Stderr, id, b"PHP Notice: something", &mut out);
            encode_stream(RecordType::Stdout, id, stdout, &mut out);
            encode_stream_end(RecordType::Stdout, id, &mut out);
            encode_stream(RecordType::EndRequest, id, &end(ProtocolStatus::RequestComplete), &mut out);
        },
        Reply::Garbage => out.extend_from_slice(b"this is not FastCGI at all"),
        Reply::Hangup => {},
        Reply::Reject(status) => encode_stream(RecordType::EndRequest, id, &end(status), &mut out),
    }
    if matches!(reply, Reply::Hangup) {
        drop(conn);
    } else {
        let _written = conn.write_all(&out).await;
        // Wait for the gateway to close its end
        while next_record(&mut conn, &mut buf, &mut decoder).await.is_some() {}
    }
    stats.closed.fetch_add(1, Ordering::SeqCst);
}


pub fn config(root: &std::path::Path, prefix: &str) -> GatewayConfig {
    let endpoint = Endpoint::new("tcp", "127.0.0.1:9000").expect("valid endpoint");
    GatewayConfig::new(endpoint, root, prefix).expect("valid config")
}

pub fn gateway(config: GatewayConfig, app: &FakeApp) -> Gateway<FakeApp> {
    Gateway::with_transport(config, app.clone()).with_diagnostics(Arc::new(NullSink))
}

pub fn info(secure: bool) -> ConnectionInfo {
    ConnectionInfo {
        remote: ([192, 0, 2, 1], 40000).into(),
        local: ([127, 0, 0, 1], 8080).into(),
        secure,
    }
}

pub fn get(uri: &str) -> http::Request<Full<Bytes>> {
    http::Request::builder()
        .uri(uri)
        .header(http::header::HOST, "example.com")
        .extension(info(false))
        .body(Full::default())
        .expect("valid request")
}

pub async fn body_of(resp: http::Response<GatewayBody>) -> Vec<u8> {
    resp.into_body().collect().await.expect("body").to_bytes().to_vec()
}

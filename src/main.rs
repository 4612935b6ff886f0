use std::io;
use std::net::SocketAddr;
use std::num::NonZeroU16;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use fastcgi_gateway::{serve, Endpoint, Gateway, GatewayConfig};


/// Serves a document root over HTTP, running scripts on a FastCGI
/// application server such as PHP-FPM.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address to accept HTTP connections on
    #[arg(long, env = "FCGI_GATEWAY_LISTEN", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Network of the FastCGI application: `tcp` or `unix`
    #[arg(long, env = "FCGI_GATEWAY_NETWORK", default_value = "tcp")]
    network: String,

    /// Address of the FastCGI application: `host:port` or a socket path
    #[arg(long, env = "FCGI_GATEWAY_ADDRESS")]
    address: String,

    /// Directory holding scripts and static files
    #[arg(long, env = "FCGI_GATEWAY_DOCUMENT_ROOT")]
    document_root: PathBuf,

    /// URL path the document root is mounted at
    #[arg(long, env = "FCGI_GATEWAY_URL_PREFIX", default_value = "")]
    url_prefix: String,

    /// Script run for URLs ending in `/`
    #[arg(long, env = "FCGI_GATEWAY_INDEX_FILE", default_value = GatewayConfig::DEFAULT_INDEX)]
    index_file: String,

    /// Suffix marking the end of a script path
    #[arg(long, env = "FCGI_GATEWAY_SCRIPT_EXTENSION", default_value = GatewayConfig::DEFAULT_EXTENSION)]
    script_extension: String,

    /// Upper bound for FastCGI request ids
    #[arg(long, env = "FCGI_GATEWAY_MAX_REQUESTS", default_value = "20")]
    max_requests: NonZeroU16,

    /// Seconds to wait for a connection to the FastCGI application
    #[arg(long, env = "FCGI_GATEWAY_CONNECT_TIMEOUT", default_value_t = 5)]
    connect_timeout: u64,

    /// Seconds to wait for each read or write on a FastCGI connection
    #[arg(long, env = "FCGI_GATEWAY_IO_TIMEOUT", default_value_t = 60)]
    io_timeout: u64,

    /// Bytes of request body buffered when the length is unknown
    #[arg(long, env = "FCGI_GATEWAY_MAX_BUFFERED_BODY", default_value_t = 8 << 20)]
    max_buffered_body: usize,
}

impl Args {
    fn config(&self) -> Result<GatewayConfig, Box<dyn std::error::Error>> {
        let endpoint = Endpoint::new(&self.network, &self.address)?;
        let root = std::fs::canonicalize(&self.document_root)
            .map_err(|e| format!("document root {}: {e}", self.document_root.display()))?;
        let config = GatewayConfig::new(endpoint, root, &self.url_prefix)?
            .with_index_file(&self.index_file)?
            .with_script_extension(&self.script_extension)?
            .with_max_requests(self.max_requests)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout))
            .with_io_timeout(Duration::from_secs(self.io_timeout))
            .with_max_buffered_body(self.max_buffered_body);
        Ok(config)
    }
}


#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();
    let config = args.config()?;
    tracing::info!(root = %config.document_root().display(), prefix = config.url_prefix(), "gateway configured");

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    let gateway = Arc::new(Gateway::new(config));
    let shutdown = async {
        if let Err(e) = quit().await {
            let error: &dyn std::error::Error = &e;
            tracing::error!(error, "waiting for quit signal failed");
        }
        tracing::info!("shutting down");
    };

    serve(listener, gateway, shutdown).await?;
    tracing::info!("all connections closed");
    Ok(())
}


/// Waits for a signal to shut the gateway down.
#[cfg(not(unix))]
fn quit() -> impl std::future::Future<Output = io::Result<()>> {
    tokio::signal::ctrl_c()
}

/// Waits for a signal to shut the gateway down.
#[cfg(unix)]
async fn quit() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => r,
        _ = term.recv() => Ok(()),
    }
}


/// Sets up a basic `tracing` subscriber to stderr. Its verbosity level is
/// configured with the `RUST_LOG` environment variable.
fn init_tracing() {
    use tracing_subscriber::{filter::LevelFilter, fmt};
    let max_level = match std::env::var("RUST_LOG") {
        Ok(var) if !var.is_empty() => match var.parse::<LevelFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Ignoring `RUST_LOG={var}`: {e}");
                LevelFilter::INFO
            },
        },
        Ok(_) | Err(std::env::VarError::NotPresent) => LevelFilter::INFO,
        Err(e) => {
            eprintln!("Ignoring `RUST_LOG`: {e}");
            LevelFilter::INFO
        },
    };

    fmt::fmt()
        .with_timer(fmt::time::uptime())
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .init();
}

//! An HTTP gateway in front of a FastCGI application server.
//!
//! Every request path is mapped onto a document root. Paths naming a script
//! (by default, anything with a `.php` segment) are forwarded to the
//! FastCGI application as a responder request, with `SCRIPT_NAME`,
//! `PATH_INFO` and the other CGI/1.1 variables filled in. Directory URLs run
//! the directory's index script, and everything else is served as a static
//! file. Paths that would leave the document root are rejected.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use fastcgi_gateway::{Endpoint, Gateway, GatewayConfig};
//!
//! let endpoint = Endpoint::new("tcp", "127.0.0.1:9000")?;
//! let config = GatewayConfig::new(endpoint, "/srv/www", "")?;
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! fastcgi_gateway::serve(listener, Arc::new(Gateway::new(config)), std::future::pending()).await?;
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code, single_use_lifetimes, unused_lifetimes)]
#![warn(keyword_idents, let_underscore_drop, unreachable_pub, unused_import_braces)]

#![deny(clippy::suspicious)]
#![warn(clippy::cargo)]
#![deny(clippy::exit, clippy::semicolon_inside_block, clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::multiple_crate_versions)]
#![allow(clippy::enum_glob_use, clippy::items_after_statements, clippy::module_name_repetitions)]


// See: https://fastcgi-archives.github.io/FastCGI_Specification.html
pub mod protocol;

/// CGI/1.1 variables and response heads.
pub mod cgi;

pub mod config;
/// Mapping of request paths onto the document root.
pub mod mapper;
pub mod transport;
/// A FastCGI client for single responder requests.
pub mod client;
pub mod diagnostics;
pub mod body;
pub mod static_files;
pub mod gateway;
pub mod server;

pub use config::{Endpoint, GatewayConfig};
pub use diagnostics::{DiagnosticSink, NullSink, TracingSink};
pub use gateway::Gateway;
pub use mapper::{resolve, SecurityError, Target};
pub use server::{serve, ConnectionInfo};
pub use transport::{SocketTransport, Transport};

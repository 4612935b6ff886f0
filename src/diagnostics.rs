/// A destination for the `Stderr` stream of FastCGI applications.
///
/// Applications such as PHP report warnings and uncaught errors on this
/// stream. It never reaches the HTTP client.
pub trait DiagnosticSink: Send + Sync {
    /// Handles one chunk of `Stderr` output. Chunks follow the record
    /// boundaries chosen by the application, not line boundaries.
    fn stderr(&self, data: &[u8]);
}

/// Logs application diagnostics as `tracing` events.
///
/// Every chunk becomes a `warn` event with the target `fastcgi::stderr`,
/// so it can be filtered separately from the gateway's own events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn stderr(&self, data: &[u8]) {
        let text = String::from_utf8_lossy(data);
        let text = text.trim_end();
        if !text.is_empty() {
            tracing::warn!(target: "fastcgi::stderr", message = text);
        }
    }
}

/// Discards application diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    #[inline]
    fn stderr(&self, _data: &[u8]) {}
}

use tokio::sync::watch;


/// Marks an HTTP connection as active until dropped.
#[must_use = "the connection counts as closed once its guard is dropped"]
#[derive(Debug)]
pub(crate) struct ConnGuard(#[allow(dead_code)] watch::Receiver<()>);

/// Counts the connections served by an accept loop, so that shutdown can
/// wait for them to finish.
///
/// Every guard holds a receiver of the same channel, so the channel closes
/// when the last one is dropped.
#[derive(Debug)]
pub(crate) struct ConnTracker(watch::Sender<()>);

impl ConnTracker {
    #[inline]
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(());
        Self(tx)
    }

    /// Registers a new active connection.
    #[inline]
    pub(crate) fn track(&self) -> ConnGuard {
        ConnGuard(self.0.subscribe())
    }

    #[inline]
    #[must_use]
    pub(crate) fn active(&self) -> usize {
        self.0.receiver_count()
    }

    /// Waits until every [`ConnGuard`] is gone.
    pub(crate) async fn drained(self) {
        self.0.closed().await;
    }
}

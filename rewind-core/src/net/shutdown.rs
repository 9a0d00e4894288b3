use tokio::sync::watch;

/// Cooperative cancellation token for connection tasks.
///
/// Every stream read in the engine races against `recv()` in a
/// `tokio::select!`; firing the [`ShutdownSignal`] aborts in-flight reads and
/// unwinds the per-connection tasks. A write that lost the race but already
/// failed keeps its I/O error; [`crate::error::Error::Closed`] is returned
/// only when there was no prior wire error.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> (ShutdownSignal, Shutdown) {
        let (tx, rx) = watch::channel(false);

        (ShutdownSignal { tx }, Shutdown { rx })
    }

    /// Resolves once the signal fires (or its sender is dropped).
    pub async fn recv(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        *self.rx.borrow()
    }
}

impl ShutdownSignal {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

impl Drop for ShutdownSignal {
    fn drop(&mut self) {
        let _ = self.tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::Shutdown;

    #[tokio::test]
    async fn recv_resolves_after_signal() {
        let (signal, mut shutdown) = Shutdown::new();

        assert!(!shutdown.is_shut_down());
        signal.shutdown();
        shutdown.recv().await;
        assert!(shutdown.is_shut_down());
    }

    #[tokio::test]
    async fn recv_resolves_when_signal_dropped() {
        let (signal, mut shutdown) = Shutdown::new();

        drop(signal);
        shutdown.recv().await;
    }
}

use std::future::Future;
use std::io;
use std::sync::mpsc;
use std::time::Duration;

use tokio::runtime::Handle;

pub const DEFAULT_BRIDGE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("async operation failed: {0}")]
    Op(#[source] io::Error),
    #[error("async operation timed out after {0:?}")]
    TimedOut(Duration),
    #[error("async operation was dropped before completing")]
    Canceled,
}

/// Turns an async socket-runtime operation into a blocking call.
///
/// The operation is spawned onto the runtime and its outcome funnelled
/// back through a rendezvous channel the calling thread waits on. The
/// wait is bounded; an operation that outlives the timeout keeps running
/// on the runtime but its result is discarded.
///
/// Must not be called from a runtime worker thread - the whole point is
/// to park a thread the runtime does not own.
pub struct AsyncBridge {
    handle: Handle,
    timeout: Duration,
}

impl AsyncBridge {
    pub fn new(handle: Handle) -> Self {
        Self::with_timeout(handle, DEFAULT_BRIDGE_TIMEOUT)
    }

    pub fn with_timeout(handle: Handle, timeout: Duration) -> Self {
        Self { handle, timeout }
    }

    pub fn wait<T, F>(&self, op: F) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: Future<Output = io::Result<T>> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        self.handle.spawn(async move {
            let _ = tx.send(op.await);
        });
        match rx.recv_timeout(self.timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(BridgeError::Op(e)),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(BridgeError::TimedOut(self.timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(BridgeError::Canceled),
        }
    }
}

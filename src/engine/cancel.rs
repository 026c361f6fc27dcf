// src/engine/cancel.rs

//! One-shot cancellation signal for a running job.
//!
//! The registry keeps the [`CancelTrigger`]; the lifecycle task owns the
//! matching [`CancelWatch`]. Requesting cancellation consumes the sender, so
//! a second request is a harmless no-op. When the lifecycle finishes it drops
//! the watch, which retires the signal: later requests simply report that
//! nobody was listening.

use tokio::sync::oneshot;

/// Request side, held in the running index.
#[derive(Debug)]
pub struct CancelTrigger {
    tx: Option<oneshot::Sender<()>>,
}

/// Observe side, held by the lifecycle task.
#[derive(Debug)]
pub struct CancelWatch {
    rx: oneshot::Receiver<()>,
}

/// Create a fresh trigger/watch pair for a new job.
pub fn channel() -> (CancelTrigger, CancelWatch) {
    let (tx, rx) = oneshot::channel();
    (CancelTrigger { tx: Some(tx) }, CancelWatch { rx })
}

impl CancelTrigger {
    /// Ask the job to stop.
    ///
    /// Returns `true` only for the first request that reached a live
    /// lifecycle task.
    pub fn request(&mut self) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

impl CancelWatch {
    /// Resolve when cancellation is requested.
    ///
    /// If the trigger is dropped without a request this never resolves; the
    /// lifecycle then finishes through process exit instead.
    pub async fn cancelled(self) {
        if self.rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

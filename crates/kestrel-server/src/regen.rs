//! Regeneration trigger queue
//!
//! Inventory mutations request a regeneration instead of running one inline.
//! A single worker owns the pipeline; the queue in front of it holds at most
//! one pending request. A request made while a run is in flight takes the
//! slot, and anything beyond that coalesces into it. N rapid mutations cost
//! at most the in-flight run plus one follow-up, and two runs never overlap.

use std::future::Future;

use tokio::sync::mpsc;
use tracing::debug;

#[derive(Clone)]
pub struct RegenQueue {
    tx: mpsc::Sender<()>,
}

impl RegenQueue {
    /// Spawn the worker and hand back the trigger handle.
    pub fn spawn<F, Fut>(run: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                run().await;
            }
        });
        Self { tx }
    }

    /// Request a regeneration. Never blocks; requests beyond the pending one
    /// are absorbed.
    pub fn request(&self) {
        match self.tx.try_send(()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("regeneration already pending, coalescing");
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                debug!("regeneration worker stopped, dropping request");
            }
        }
    }
}

//! Per-call cancellation.
//!
//! An [`AbortController`] hands out [`AbortSignal`]s. Attaching a signal to a request
//! lets the caller abort it while it is in flight; the pipeline reports the abort as
//! [`Error::Cancelled`](crate::Error::Cancelled) and never retries it.

use tokio::sync::watch;

/// The owning side of a cancellation signal.
///
/// # Examples
///
/// ```
/// use openfetch::AbortController;
///
/// let controller = AbortController::new();
/// let signal = controller.signal();
///
/// assert!(!signal.is_aborted());
/// controller.abort();
/// assert!(signal.is_aborted());
/// ```
#[derive(Debug)]
pub struct AbortController {
    sender: watch::Sender<bool>,
}

impl AbortController {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Returns a signal observing this controller.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Fires the signal. Aborting twice is a no-op.
    pub fn abort(&self) {
        self.sender.send_replace(true);
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// The observing side of a cancellation signal.
///
/// Signals are cheap to clone; every clone observes the same controller.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    receiver: watch::Receiver<bool>,
}

impl AbortSignal {
    /// Returns `true` once the controller has aborted.
    pub fn is_aborted(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Completes when the controller aborts.
    ///
    /// If the controller is dropped without aborting, this never completes.
    pub async fn aborted(&self) {
        let mut receiver = self.receiver.clone();
        let closed = receiver.wait_for(|aborted| *aborted).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

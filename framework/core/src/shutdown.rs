use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::{Receiver, Sender};
use tokio::sync::Mutex;

/// Broadcasts a one-shot stop signal to any number of listeners.
///
/// The runner uses one handle for the whole run and one handle per virtual user. Once
/// [ShutdownHandle::shutdown] has been called the handle stays in the stopped state, so a listener
/// created after the signal was sent still observes it.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Sender<()>,
    requested: Arc<AtomicBool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: tokio::sync::broadcast::channel(1).0,
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown(&self) {
        if self.requested.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = self.sender.send(()) {
            // Nobody is waiting right now. Listeners will still see the flag.
            log::trace!("Shutdown signal had no active receivers: {e:?}");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe(), self.requested.clone())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Arc<Mutex<Receiver<()>>>,
    requested: Arc<AtomicBool>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<()>, requested: Arc<AtomicBool>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
            requested,
        }
    }

    /// Point in time check if the shutdown signal has been sent. If this returns true then work
    /// should be stopped at the next safe point.
    pub fn should_shutdown(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Wait for the shutdown signal. It is safe to race this with another future so that the
    /// shutdown signal can be used to cancel work in progress.
    ///
    /// If every [ShutdownHandle] has been dropped without sending the signal, this never resolves.
    pub async fn wait_for_shutdown(&mut self) {
        let mut receiver = self.receiver.lock().await;
        loop {
            if self.requested.load(Ordering::SeqCst) {
                return;
            }

            match receiver.recv().await {
                Ok(()) => return,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => std::future::pending::<()>().await,
            }
        }
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "Execution cancelled by shutdown signal".to_string(),
        }
    }
}

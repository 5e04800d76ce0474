//! Background periodic sync: one thread, one user, one pass in flight.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::auth::Session;
use crate::remote::ServerAdapter;
use crate::store::LocalStore;
use crate::sync::{CancelFlag, SyncEngine};

/// Runs a full sync on spawn and then once per interval until shut down.
pub struct SyncWorker {
    stop_tx: mpsc::Sender<()>,
    cancel: CancelFlag,
    handle: JoinHandle<()>,
}

impl SyncWorker {
    pub fn spawn(
        store: Arc<LocalStore>,
        remote: Arc<dyn ServerAdapter>,
        session: Arc<Session>,
        interval: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let cancel = CancelFlag::default();
        let pass_cancel = cancel.clone();

        let handle = thread::spawn(move || {
            info!(interval_secs = interval.as_secs(), "sync worker started");
            loop {
                let engine = SyncEngine::new(&store, remote.as_ref());
                match engine.full_sync(&session, &pass_cancel) {
                    Ok(outcome) if outcome.cancelled => {
                        debug!("sync pass cancelled");
                        break;
                    }
                    Ok(outcome) => debug!(?outcome, "background sync pass complete"),
                    // Aborted cleanly; the next tick retries.
                    Err(err) => warn!(%err, "background sync pass aborted"),
                }

                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            info!("sync worker stopped");
        });

        Self {
            stop_tx,
            cancel,
            handle,
        }
    }

    /// Cancel any in-flight pass at its next action boundary and join.
    pub fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.stop_tx.send(());
        let _ = self.handle.join();
    }
}

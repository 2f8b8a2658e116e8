//! Background worker draining the restock queue.

use store::Store;
use tokio::task::JoinHandle;

use crate::dispatcher::RestockDispatcher;
use crate::queue::RestockReceiver;

/// Drains the restock queue, one dispatch at a time.
///
/// The worker owns its own store handle, so it keeps running after the
/// request that triggered a restock has returned.
pub struct NotificationWorker<S: Store> {
    dispatcher: RestockDispatcher<S>,
    receiver: RestockReceiver,
}

impl<S: Store + 'static> NotificationWorker<S> {
    pub fn new(dispatcher: RestockDispatcher<S>, receiver: RestockReceiver) -> Self {
        Self {
            dispatcher,
            receiver,
        }
    }

    /// Processes jobs until every queue handle has been dropped.
    pub async fn run(mut self) {
        tracing::info!("Restock notification worker started");

        while let Some(job) = self.receiver.recv().await {
            if let Err(e) = self.dispatcher.dispatch(job.item_id).await {
                metrics::counter!("restock_dispatch_errors_total").increment(1);
                tracing::error!(item_id = %job.item_id, error = %e, "Restock dispatch failed");
            }
        }

        tracing::info!("Restock notification worker stopped");
    }

    /// Runs the worker on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

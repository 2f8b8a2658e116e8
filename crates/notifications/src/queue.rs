//! Bounded in-process queue between inventory writes and the dispatch worker.

use common::CatalogItemId;
use domain::InventoryListener;
use store::StockChange;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

/// One restock to announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestockJob {
    pub item_id: CatalogItemId,
}

/// Sending half of the restock queue.
///
/// Plugged into the domain services as their [`InventoryListener`]. Only
/// restock transitions are enqueued, and enqueueing never waits: when the
/// queue is full the job is dropped with a warning.
#[derive(Debug, Clone)]
pub struct RestockQueue {
    sender: mpsc::Sender<RestockJob>,
}

/// Receiving half of the restock queue.
#[derive(Debug)]
pub struct RestockReceiver {
    receiver: mpsc::Receiver<RestockJob>,
}

impl RestockQueue {
    /// Creates a queue holding at most `capacity` pending jobs.
    pub fn bounded(capacity: usize) -> (RestockQueue, RestockReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (RestockQueue { sender }, RestockReceiver { receiver })
    }

    /// Enqueues a job without waiting. Returns false if it was dropped.
    pub fn enqueue(&self, job: RestockJob) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => {
                metrics::counter!("restock_jobs_enqueued_total").increment(1);
                true
            }
            Err(TrySendError::Full(job)) => {
                metrics::counter!("restock_jobs_dropped_total").increment(1);
                tracing::warn!(item_id = %job.item_id, "Restock queue full, dropping job");
                false
            }
            Err(TrySendError::Closed(job)) => {
                tracing::warn!(item_id = %job.item_id, "Restock worker gone, dropping job");
                false
            }
        }
    }
}

impl InventoryListener for RestockQueue {
    fn on_inventory_changed(&self, change: &StockChange) {
        if change.is_restock() {
            self.enqueue(RestockJob {
                item_id: change.item_id,
            });
        }
    }
}

impl RestockReceiver {
    /// Waits for the next job. Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<RestockJob> {
        self.receiver.recv().await
    }

    /// Takes the next job if one is ready.
    pub fn try_recv(&mut self) -> Option<RestockJob> {
        match self.receiver.try_recv() {
            Ok(job) => Some(job),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(previous: Option<i32>, current: Option<i32>) -> StockChange {
        StockChange {
            item_id: CatalogItemId::new(),
            previous,
            current,
        }
    }

    #[test]
    fn only_restocks_are_enqueued() {
        let (queue, mut receiver) = RestockQueue::bounded(8);

        queue.on_inventory_changed(&change(Some(3), Some(5)));
        queue.on_inventory_changed(&change(Some(2), Some(0)));
        queue.on_inventory_changed(&change(None, Some(4)));
        assert_eq!(receiver.try_recv(), None);

        let restock = change(Some(0), Some(1));
        queue.on_inventory_changed(&restock);
        assert_eq!(
            receiver.try_recv(),
            Some(RestockJob {
                item_id: restock.item_id
            })
        );
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (queue, mut receiver) = RestockQueue::bounded(1);

        assert!(queue.enqueue(RestockJob {
            item_id: CatalogItemId::new()
        }));
        assert!(!queue.enqueue(RestockJob {
            item_id: CatalogItemId::new()
        }));

        assert!(receiver.try_recv().is_some());
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn closed_queue_drops() {
        let (queue, receiver) = RestockQueue::bounded(1);
        drop(receiver);

        assert!(!queue.enqueue(RestockJob {
            item_id: CatalogItemId::new()
        }));
    }
}

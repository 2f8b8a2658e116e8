//! Restock fan-out.

use std::sync::Arc;

use chrono::Utc;
use common::{CatalogItemId, SubscriptionId};
use store::{CatalogItem, Store};

use crate::error::{NotificationError, Result};
use crate::mailer::{Mailer, RestockMessage};

/// Outcome of one restock dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub item_id: CatalogItemId,
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Sends one message to every pending subscriber of a restocked item.
///
/// Subscribers are read in one transaction and marked notified in another;
/// no transaction is held open while messages are being sent. A subscriber
/// whose delivery fails stays pending and is retried on the next restock.
pub struct RestockDispatcher<S: Store> {
    store: S,
    mailer: Arc<dyn Mailer>,
    base_url: String,
}

impl<S: Store> RestockDispatcher<S> {
    /// Creates a dispatcher. `base_url` is the public storefront origin used
    /// to build product links.
    pub fn new(store: S, mailer: Arc<dyn Mailer>, base_url: impl Into<String>) -> Self {
        Self {
            store,
            mailer,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Canonical product page link for an item.
    pub fn item_url(&self, item: &CatalogItem) -> String {
        format!("{}/products/{}", self.base_url, item.slug)
    }

    #[tracing::instrument(skip(self))]
    pub async fn dispatch(&self, item_id: CatalogItemId) -> Result<DeliveryReport> {
        let (item, subscriptions) = {
            let mut tx = self.store.begin().await?;
            let item = tx
                .catalog_item(item_id)
                .await?
                .ok_or(NotificationError::ItemNotFound { item_id })?;
            let subscriptions = tx.pending_restock_subscriptions(item_id).await?;
            (item, subscriptions)
        };

        let item_url = self.item_url(&item);
        let subject = format!("{} is back in stock", item.name);
        let mut delivered: Vec<SubscriptionId> = Vec::with_capacity(subscriptions.len());
        let mut failed = 0;

        for subscription in &subscriptions {
            let message = RestockMessage {
                recipient: subscription.email.clone(),
                subject: subject.clone(),
                item_name: item.name.clone(),
                item_url: item_url.clone(),
            };

            match self.mailer.send(&message).await {
                Ok(()) => {
                    metrics::counter!("restock_notifications_total", "result" => "delivered")
                        .increment(1);
                    delivered.push(subscription.id);
                }
                Err(e) => {
                    metrics::counter!("restock_notifications_total", "result" => "failed")
                        .increment(1);
                    tracing::warn!(
                        subscription_id = %subscription.id,
                        recipient = %subscription.email,
                        error = %e,
                        "Restock notification failed"
                    );
                    failed += 1;
                }
            }
        }

        if !delivered.is_empty() {
            let now = Utc::now();
            let mut tx = self.store.begin().await?;
            for id in &delivered {
                tx.mark_subscription_notified(*id, now).await?;
            }
            tx.commit().await?;
        }

        let report = DeliveryReport {
            item_id,
            attempted: subscriptions.len(),
            delivered: delivered.len(),
            failed,
        };
        tracing::info!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "Restock dispatch finished"
        );
        Ok(report)
    }
}

//! Restock notifications.
//!
//! Inventory writes report their changes to a [`RestockQueue`]. Restock
//! transitions are queued and a [`NotificationWorker`] drains the queue on its
//! own task, handing each job to a [`RestockDispatcher`] that fans out one
//! message per pending subscriber through a [`Mailer`].

pub mod dispatcher;
pub mod error;
pub mod mailer;
pub mod queue;
pub mod worker;

pub use dispatcher::{DeliveryReport, RestockDispatcher};
pub use error::{DeliveryError, NotificationError, Result};
pub use mailer::{InMemoryMailer, LogMailer, Mailer, RestockMessage};
pub use queue::{RestockJob, RestockQueue, RestockReceiver};
pub use worker::NotificationWorker;

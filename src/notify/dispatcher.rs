//! Delivery strategy selection and execution

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::mail::{MailMessage, MailTransport};

use super::{message, Notification, NotificationBatch, NotificationHandle};

/// Largest recipient count still sent strictly sequentially
pub const SEQUENTIAL_MAX_RECIPIENTS: usize = 5;

/// Largest recipient count handled by the small parallel pool
pub const SMALL_POOL_MAX_RECIPIENTS: usize = 20;

/// Largest recipient count handled by the large parallel pool; above this
/// the dispatcher falls back to paced sub-batches
pub const LARGE_POOL_MAX_RECIPIENTS: usize = 50;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Worker cap for the small parallel strategy
    pub small_pool_workers: usize,
    /// Worker cap for the large parallel strategy
    pub large_pool_workers: usize,
    /// Recipients per sub-batch in the paced strategy
    pub sub_batch_size: usize,
    /// Pause between paced sub-batches
    pub batch_pause: Duration,
    /// Per-recipient timeout in the parallel and paced strategies
    pub send_timeout: Duration,
    /// Outbound channel capacity
    pub queue_depth: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            small_pool_workers: 5,
            large_pool_workers: 10,
            sub_batch_size: 20,
            batch_pause: Duration::from_secs(1),
            send_timeout: Duration::from_secs(30),
            queue_depth: 64,
        }
    }
}

/// How a batch of recipients will be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStrategy {
    Sequential,
    ParallelSmall,
    ParallelLarge,
    PacedBatches,
}

/// Select the delivery strategy for a recipient count
pub fn select_strategy(recipient_count: usize) -> DeliveryStrategy {
    if recipient_count <= SEQUENTIAL_MAX_RECIPIENTS {
        DeliveryStrategy::Sequential
    } else if recipient_count <= SMALL_POOL_MAX_RECIPIENTS {
        DeliveryStrategy::ParallelSmall
    } else if recipient_count <= LARGE_POOL_MAX_RECIPIENTS {
        DeliveryStrategy::ParallelLarge
    } else {
        DeliveryStrategy::PacedBatches
    }
}

/// Outcome of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Recipients delivered to
    pub sent: usize,
    /// Recipients that failed or timed out
    pub failed: usize,
}

impl DispatchReport {
    fn merge(&mut self, other: DispatchReport) {
        self.sent += other.sent;
        self.failed += other.failed;
    }
}

/// Consumes the outbound channel and delivers completion notices
pub struct NotificationDispatcher<M: MailTransport> {
    config: NotifyConfig,
    transport: Arc<M>,
}

impl<M: MailTransport + 'static> NotificationDispatcher<M> {
    /// Create a dispatcher over the given transport
    pub fn new(config: NotifyConfig, transport: Arc<M>) -> Self {
        Self { config, transport }
    }

    /// Spawn the dispatcher worker and return the channel handle
    pub fn spawn(config: NotifyConfig, transport: Arc<M>) -> NotificationHandle {
        let (tx, mut rx) = mpsc::channel::<Notification>(config.queue_depth);
        let dispatcher = Self::new(config, transport);

        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                dispatcher.handle(notification).await;
            }
            debug!("Notification channel closed; dispatcher exiting");
        });

        NotificationHandle::new(tx)
    }

    /// Handle one queued notification
    pub async fn handle(&self, notification: Notification) {
        match notification {
            Notification::BatchSigned(batch) => {
                let report = self.deliver_batch(&batch).await;
                info!(
                    sent = report.sent,
                    failed = report.failed,
                    "Batch notification dispatch finished"
                );
            }
            Notification::Rejected {
                recipient,
                recipient_name,
                signer_name,
                title,
                comment,
            } => {
                let mail =
                    message::rejection_message(&recipient, &recipient_name, &signer_name, &title, &comment);
                if let Err(e) = self.transport.send(&mail).await {
                    warn!(recipient = %recipient, error = %e, "Rejection notice failed");
                }
            }
        }
    }

    /// Deliver one aggregated message per recipient
    ///
    /// Each send is independent and best-effort; one recipient's failure
    /// never aborts the batch and nothing is retried.
    pub async fn deliver_batch(&self, batch: &NotificationBatch) -> DispatchReport {
        let messages: Vec<MailMessage> = batch
            .recipients
            .iter()
            .map(|(address, digest)| {
                message::batch_signed_message(address, digest, &batch.signer_name)
            })
            .collect();

        let strategy = select_strategy(messages.len());
        info!(
            recipients = messages.len(),
            strategy = ?strategy,
            "Dispatching completion notices"
        );

        match strategy {
            DeliveryStrategy::Sequential => self.send_sequential(messages).await,
            DeliveryStrategy::ParallelSmall => {
                self.send_parallel(messages, self.config.small_pool_workers).await
            }
            DeliveryStrategy::ParallelLarge => {
                self.send_parallel(messages, self.config.large_pool_workers).await
            }
            DeliveryStrategy::PacedBatches => self.send_paced(messages).await,
        }
    }

    async fn send_sequential(&self, messages: Vec<MailMessage>) -> DispatchReport {
        let mut report = DispatchReport::default();
        for mail in messages {
            match self.transport.send(&mail).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(recipient = %mail.to, error = %e, "Notification send failed");
                }
            }
        }
        report
    }

    async fn send_parallel(&self, messages: Vec<MailMessage>, worker_cap: usize) -> DispatchReport {
        let semaphore = Arc::new(Semaphore::new(worker_cap.max(1)));
        let timeout = self.config.send_timeout;

        let tasks = messages.into_iter().map(|mail| {
            let semaphore = Arc::clone(&semaphore);
            let transport = Arc::clone(&self.transport);
            tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return false,
                };
                match tokio::time::timeout(timeout, transport.send(&mail)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        warn!(recipient = %mail.to, error = %e, "Notification send failed");
                        false
                    }
                    Err(_) => {
                        warn!(recipient = %mail.to, "Notification send timed out");
                        false
                    }
                }
            })
        });

        let mut report = DispatchReport::default();
        for outcome in join_all(tasks).await {
            match outcome {
                Ok(true) => report.sent += 1,
                _ => report.failed += 1,
            }
        }
        report
    }

    async fn send_paced(&self, messages: Vec<MailMessage>) -> DispatchReport {
        let mut report = DispatchReport::default();
        let sub_batch_size = self.config.sub_batch_size.max(1);
        let total_batches = messages.len().div_ceil(sub_batch_size);

        for (index, sub_batch) in messages.chunks(sub_batch_size).enumerate() {
            debug!(
                sub_batch = index + 1,
                of = total_batches,
                recipients = sub_batch.len(),
                "Sending paced sub-batch"
            );
            report.merge(
                self.send_parallel(sub_batch.to_vec(), self.config.large_pool_workers)
                    .await,
            );

            if index + 1 < total_batches {
                tokio::time::sleep(self.config.batch_pause).await;
            }
        }

        report
    }
}

use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::watch;
use crate::config::NotifyConfig;
use crate::subscriber_manager::SubscriberHandle;

/// Outcome of one fan-out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Pushes status changes to every live subscriber.
#[derive(Clone)]
pub struct NotificationDispatcher {
    subscribers: SubscriberHandle,
    status_tx: Arc<watch::Sender<String>>,
    client: reqwest::Client,
    retries: u32,
    retry_backoff: Duration,
}

impl NotificationDispatcher {
    pub fn new(subscribers: SubscriberHandle, config: &NotifyConfig, initial_status: &str) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(config.timeout());
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        let (status_tx, _) = watch::channel(initial_status.to_string());

        Ok(Self {
            subscribers,
            status_tx: Arc::new(status_tx),
            client,
            retries: config.retries,
            retry_backoff: config.retry_backoff(),
        })
    }

    /// Receiver for the status query endpoint
    pub fn status(&self) -> watch::Receiver<String> {
        self.status_tx.subscribe()
    }

    pub fn current_status(&self) -> String {
        self.status_tx.borrow().clone()
    }

    /// Record the new status, prune expired subscribers and deliver the
    /// status to the rest. Deliveries run concurrently and are all joined
    /// before this returns. Failures are logged, never returned, and never
    /// remove a subscriber.
    pub async fn update_status(&self, status: &str) -> DeliveryReport {
        self.status_tx.send_replace(status.to_string());
        tracing::info!("Status changed to {:?}", status);

        let live = match self.subscribers.live(Utc::now()).await {
            Ok(live) => live,
            Err(e) => {
                tracing::error!("Subscriber thread unavailable: {}", e);
                return DeliveryReport::default();
            }
        };

        let deliveries = live
            .iter()
            .map(|sub| self.deliver(&sub.callback_url, status));
        let results = join_all(deliveries).await;

        let mut report = DeliveryReport::default();
        for (sub, result) in live.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!("Failed to notify {}: {:#}", sub.callback_url, e);
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(
            "Notified {} subscriber(s), {} failed",
            report.delivered,
            report.failed
        );
        report
    }

    async fn deliver(&self, url: &str, status: &str) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.post(url, status).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= self.retries => return Err(e),
                Err(e) => {
                    let backoff = self.retry_backoff.saturating_mul(2u32.saturating_pow(attempt));
                    tracing::debug!("Delivery to {} failed ({}), retrying in {:?}", url, e, backoff);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn post(&self, url: &str, status: &str) -> Result<()> {
        self.client
            .post(url)
            .header(CONTENT_TYPE, "text/plain")
            .body(status.to_string())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscribers::SubscriberStore;
    use shared::protocol::{STATUS_MOTION, STATUS_NO_MOTION};

    fn dispatcher(dir: &tempfile::TempDir) -> (NotificationDispatcher, SubscriberHandle) {
        let store = SubscriberStore::open(dir.path().join("subscribers.sub")).unwrap();
        let handle = SubscriberHandle::spawn(store);
        let config = NotifyConfig {
            timeout_secs: 2,
            retries: 0,
            retry_backoff_ms: 10,
        };
        let dispatcher = NotificationDispatcher::new(handle.clone(), &config, STATUS_NO_MOTION).unwrap();
        (dispatcher, handle)
    }

    #[tokio::test]
    async fn test_status_is_recorded_without_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, _handle) = dispatcher(&dir);
        let status = dispatcher.status();

        assert_eq!(dispatcher.current_status(), STATUS_NO_MOTION);
        let report = dispatcher.update_status(STATUS_MOTION).await;

        assert_eq!(report, DeliveryReport::default());
        assert_eq!(*status.borrow(), STATUS_MOTION);
    }

    #[tokio::test]
    async fn test_unreachable_subscriber_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, handle) = dispatcher(&dir);

        // Nothing listens on port 9 of the loopback
        handle
            .subscribe("http://127.0.0.1:9/cb".into(), Utc::now() + chrono::Duration::seconds(60))
            .await
            .unwrap();

        let report = dispatcher.update_status(STATUS_MOTION).await;
        assert_eq!(report, DeliveryReport { delivered: 0, failed: 1 });
        assert_eq!(handle.live(Utc::now()).await.unwrap().len(), 1);
    }
}

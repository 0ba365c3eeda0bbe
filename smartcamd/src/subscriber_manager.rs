use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use chrono::{DateTime, Utc};
use shared::types::Subscriber;
use crate::subscribers::SubscriberStore;

/// Commands sent to the subscriber thread
pub enum SubscriberCommand {
    Subscribe {
        callback_url: String,
        expires_at: DateTime<Utc>,
        reply: oneshot::Sender<Result<bool>>,
    },
    Prune(DateTime<Utc>, oneshot::Sender<Result<usize>>),
    /// Prune, then return what is still valid, as one step
    Live(DateTime<Utc>, oneshot::Sender<Vec<Subscriber>>),
    Shutdown,
}

/// Handle to the thread that owns the subscriber set. Every
/// read-mutate-persist sequence runs to completion on that thread, so a
/// SUBSCRIBE and a prune can never interleave.
#[derive(Clone)]
pub struct SubscriberHandle {
    tx: mpsc::Sender<SubscriberCommand>,
}

impl SubscriberHandle {
    /// Spawn a new subscriber thread owning the given store
    pub fn spawn(mut store: SubscriberStore) -> Self {
        let (tx, mut rx) = mpsc::channel::<SubscriberCommand>(256);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    SubscriberCommand::Subscribe { callback_url, expires_at, reply } => {
                        let result = store.subscribe(&callback_url, expires_at);
                        let _ = reply.send(result);
                    }
                    SubscriberCommand::Prune(now, reply) => {
                        let result = store.prune(now);
                        let _ = reply.send(result);
                    }
                    SubscriberCommand::Live(now, reply) => {
                        // A failed rewrite leaves the expired entries in place
                        // for the next prune; the snapshot still excludes them
                        if let Err(e) = store.prune(now) {
                            tracing::error!("Failed to persist pruned subscribers: {:#}", e);
                        }
                        let _ = reply.send(store.live(now));
                    }
                    SubscriberCommand::Shutdown => {
                        tracing::info!("Subscriber thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Register or renew a callback. Returns true if it was new.
    pub async fn subscribe(&self, callback_url: String, expires_at: DateTime<Utc>) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SubscriberCommand::Subscribe { callback_url, expires_at, reply })
            .await?;
        rx.await?
    }

    /// Drop expired subscribers. Returns how many were removed.
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(SubscriberCommand::Prune(now, reply)).await?;
        rx.await?
    }

    /// Prune and return the subscribers still valid at `now`, in
    /// registration order. Only a dead subscriber thread is an error here.
    pub async fn live(&self, now: DateTime<Utc>) -> Result<Vec<Subscriber>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(SubscriberCommand::Live(now, reply)).await?;
        Ok(rx.await?)
    }

    /// Shutdown the subscriber thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(SubscriberCommand::Shutdown).await?;
        Ok(())
    }
}

/// Optional periodic sweep. Lazy pruning before every fan-out stays in
/// place; this only shrinks the file sooner.
pub async fn run_sweep(
    subscribers: SubscriberHandle,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let mut sweep_interval = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = sweep_interval.tick() => {
                if let Err(e) = subscribers.prune(Utc::now()).await {
                    tracing::error!("Failed to sweep subscribers: {}", e);
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Subscriber sweep shutting down");
                break;
            }
        }
    }

    Ok(())
}

use std::io::BufRead;
use std::thread;
use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use crate::notify::NotificationDispatcher;

/// Read status lines from stdin on a plain thread. A pending blocking read
/// must not hold up runtime shutdown, so the thread is left detached.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);

    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to read status feed: {}", e);
                    break;
                }
            }
        }
        tracing::info!("Status feed closed");
    });

    rx
}

/// Forward status lines from the motion pipeline to the dispatcher.
/// Blank lines and repeats of the current status are dropped, so
/// `update_status` only sees real changes. Returns the number of updates
/// forwarded once the feed ends or on cancellation.
pub async fn run(
    mut rx: mpsc::Receiver<String>,
    dispatcher: NotificationDispatcher,
    cancel: CancellationToken,
) -> Result<usize> {
    let mut current = dispatcher.current_status();
    let mut forwarded = 0;

    loop {
        let line = tokio::select! {
            line = rx.recv() => line,
            _ = cancel.cancelled() => {
                tracing::info!("Status feed shutting down");
                break;
            }
        };

        let Some(line) = line else {
            break;
        };

        let status = line.trim();
        if status.is_empty() || status == current {
            continue;
        }

        current = status.to_string();
        dispatcher.update_status(status).await;
        forwarded += 1;
    }

    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotifyConfig;
    use crate::subscriber_manager::SubscriberHandle;
    use crate::subscribers::SubscriberStore;
    use shared::protocol::STATUS_NO_MOTION;

    #[tokio::test]
    async fn test_only_changes_are_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let store = SubscriberStore::open(dir.path().join("subscribers.sub")).unwrap();
        let handle = SubscriberHandle::spawn(store);
        let dispatcher =
            NotificationDispatcher::new(handle, &NotifyConfig::default(), STATUS_NO_MOTION).unwrap();

        let (tx, rx) = mpsc::channel(16);
        for line in ["No motion", "Motion", "Motion", "", "No motion", " Motion "] {
            tx.send(line.to_string()).await.unwrap();
        }
        drop(tx);

        let forwarded = run(rx, dispatcher.clone(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(forwarded, 3);
        assert_eq!(dispatcher.current_status(), "Motion");
    }

    #[tokio::test]
    async fn test_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let store = SubscriberStore::open(dir.path().join("subscribers.sub")).unwrap();
        let dispatcher = NotificationDispatcher::new(
            SubscriberHandle::spawn(store),
            &NotifyConfig::default(),
            STATUS_NO_MOTION,
        )
        .unwrap();

        let (_tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(run(rx, dispatcher, cancel).await.unwrap(), 0);
    }
}

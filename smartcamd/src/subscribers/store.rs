use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use shared::types::Subscriber;
use super::file;

/// In-memory subscriber set backed by a file that is always rewritten whole.
/// Entries keep their first-registration order.
pub struct SubscriberStore {
    path: PathBuf,
    subscribers: Vec<Subscriber>,
}

impl SubscriberStore {
    /// Load the persisted set (empty if the file does not exist) and drop
    /// anything that already expired. A bad magic or version is fatal.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let subscribers = match File::open(&path) {
            Ok(fh) => file::decode(BufReader::new(fh))
                .with_context(|| format!("Failed to load subscribers from {}", path.display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to open subscriber file: {}", path.display()))
            }
        };

        let mut store = Self { path, subscribers };
        store.prune(Utc::now())?;
        Ok(store)
    }

    /// Register or renew a callback, then persist the full set minus
    /// anything already expired. The in-memory set only changes once the
    /// file has been replaced. Returns true if the callback was not known
    /// before.
    pub fn subscribe(&mut self, callback_url: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        let mut next = self.subscribers.clone();
        let added = match next.iter_mut().find(|s| s.callback_url == callback_url) {
            Some(existing) => {
                existing.expires_at = expires_at;
                false
            }
            None => {
                next.push(Subscriber {
                    callback_url: callback_url.to_string(),
                    expires_at,
                });
                true
            }
        };

        let now = Utc::now();
        next.retain(|s| !s.is_expired(now));

        write_file(&self.path, &next)?;
        self.subscribers = next;
        Ok(added)
    }

    /// Remove every subscriber that expired before `now`. The file is only
    /// rewritten when something was removed, and nothing is removed from
    /// memory unless that rewrite succeeds. Returns the number removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let next = self.live(now);
        let removed = self.subscribers.len() - next.len();

        if removed > 0 {
            write_file(&self.path, &next)?;
            self.subscribers = next;
            tracing::info!("Pruned {} expired subscriber(s)", removed);
        }
        Ok(removed)
    }

    /// Subscribers still valid at `now`, in registration order
    pub fn live(&self, now: DateTime<Utc>) -> Vec<Subscriber> {
        self.subscribers
            .iter()
            .filter(|s| !s.is_expired(now))
            .cloned()
            .collect()
    }

    pub fn get(&self, callback_url: &str) -> Option<&Subscriber> {
        self.subscribers.iter().find(|s| s.callback_url == callback_url)
    }

    pub fn all(&self) -> &[Subscriber] {
        &self.subscribers
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// Write magic, version, count and entries to a temporary file next to
/// `path`, then rename it into place.
fn write_file(path: &Path, subscribers: &[Subscriber]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(&dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;

    file::encode(BufWriter::new(tmp.as_file_mut()), subscribers)
        .context("Failed to write subscriber file")?;
    tmp.as_file()
        .sync_all()
        .context("Failed to sync subscriber file")?;

    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    tracing::debug!("Persisted {} subscriber(s) to {}", subscribers.len(), path.display());
    Ok(())
}

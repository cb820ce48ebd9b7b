use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::{info, warn};
use url::Url;

use super::{PublishedArtifact, Publisher};
use crate::common::error::PublishError;

/// Stored name for an artifact served until `expires_at` (unix seconds).
pub fn expiring_name(name: &str, expires_at: i64) -> String {
    format!("{}-{}", expires_at, name)
}

/// Expiry stamped into a stored name by [`expiring_name`].
pub fn expiry_of(stored: &str) -> Option<i64> {
    let (stamp, rest) = stored.split_once('-')?;
    if rest.is_empty() {
        return None;
    }
    stamp.parse().ok()
}

pub fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Publishes artifacts into a local directory served under `/compressed`.
///
/// Used when no object storage is configured. The expiry is part of the
/// stored file name, so a URL stops resolving once its window has passed.
pub struct LocalPublisher {
    dir: PathBuf,
    base_url: Url,
    url_expiry: Duration,
}

impl LocalPublisher {
    pub fn new(dir: PathBuf, base_url: &str, url_expiry: Duration) -> Result<Self, url::ParseError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            dir,
            base_url,
            url_expiry,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Removes published files whose window closed before `now`.
    async fn sweep_expired(&self, now: i64) {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list {}: {}", self.dir.display(), e);
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(expires_at) = name.to_str().and_then(expiry_of) else {
                continue;
            };
            if expires_at > now {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => info!("🧹 Removed expired {}", entry.path().display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", entry.path().display(), e),
            }
        }
    }
}

#[async_trait]
impl Publisher for LocalPublisher {
    async fn publish(&self, artifact: &Path, name: &str) -> Result<PublishedArtifact, PublishError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let now = unix_now();
        self.sweep_expired(now).await;

        let window = i64::try_from(self.url_expiry.as_secs()).unwrap_or(i64::MAX);
        let stored = expiring_name(name, now.saturating_add(window));
        let target = self.dir.join(&stored);
        let bytes = tokio::fs::copy(artifact, &target).await?;

        let url = self
            .base_url
            .join(&format!("compressed/{}", stored))
            .map_err(|e| PublishError::Url(e.to_string()))?;

        info!("📁 Published {} bytes to {}", bytes, target.display());

        Ok(PublishedArtifact {
            key: stored,
            url: url.to_string(),
        })
    }
}

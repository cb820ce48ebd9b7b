use std::path::Path;

use async_trait::async_trait;

use crate::common::error::PublishError;

pub mod local;
pub mod s3;

/// A durably stored artifact and the URL a client may fetch it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArtifact {
    pub key: String,
    pub url: String,
}

/// Destination for transcoded artifacts.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Stores the file at `artifact` under a key derived from `name` and
    /// returns a retrieval URL for it.
    async fn publish(&self, artifact: &Path, name: &str) -> Result<PublishedArtifact, PublishError>;
}

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::settings::AppConfig;
use crate::infrastructure::storage::Publisher;
use crate::infrastructure::storage::local::LocalPublisher;
use crate::infrastructure::storage::s3::{S3Publisher, StorageService};
use crate::workers::transcoder::Transcoder;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub transcoder: Transcoder,
    pub publisher: Arc<dyn Publisher>,
}

impl AppState {
    pub fn new(config: AppConfig, transcoder: Transcoder, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            config,
            transcoder,
            publisher,
        }
    }

    /// Prepares the staging area and picks the publish target from `config`.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.staging_dir)
            .await
            .with_context(|| format!("creating staging dir {}", config.staging_dir.display()))?;

        let publisher: Arc<dyn Publisher> = match &config.storage {
            Some(storage) => {
                let service = StorageService::new(storage);
                Arc::new(S3Publisher::new(service, config.url_expiry))
            }
            None => {
                tokio::fs::create_dir_all(&config.public_dir)
                    .await
                    .with_context(|| format!("creating public dir {}", config.public_dir.display()))?;
                let local = LocalPublisher::new(
                    config.public_dir.clone(),
                    &config.public_base_url,
                    config.url_expiry,
                )
                .context("invalid PUBLIC_BASE_URL")?;
                info!("📁 No object storage configured, publishing to {}", local.dir().display());
                Arc::new(local)
            }
        };

        let transcoder = Transcoder::new(&config);
        Ok(Self::new(config, transcoder, publisher))
    }
}

use std::path::PathBuf;
use std::time::Duration;

use crate::config::env::{self, EnvKey};

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub public_base_url: String,
    pub staging_dir: PathBuf,
    pub public_dir: PathBuf,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub max_upload_bytes: usize,
    pub url_expiry: Duration,
    pub synthetic_duration: Duration,
    /// `None` publishes to `public_dir` and serves it under `/compressed`.
    pub storage: Option<StorageConfig>,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        let server_port = env::get_parsed(EnvKey::ServerPort, 3000);
        let default_base = format!("http://localhost:{}/", server_port);
        let default_staging = std::env::temp_dir().join("video-relay");

        let storage = match env::get_opt(EnvKey::StorageBucket) {
            Some(bucket) => Some(StorageConfig {
                bucket,
                endpoint: env::get_opt(EnvKey::StorageEndpoint),
                region: env::get_or(EnvKey::StorageRegion, "us-east-1"),
                access_key: env::get(EnvKey::StorageAccessKey)?,
                secret_key: env::get(EnvKey::StorageSecretKey)?,
            }),
            None => None,
        };

        Ok(Self {
            server_port,
            public_base_url: env::get_or(EnvKey::PublicBaseUrl, &default_base),
            staging_dir: env::get_opt(EnvKey::StagingDir)
                .map(PathBuf::from)
                .unwrap_or(default_staging),
            public_dir: PathBuf::from(env::get_or(EnvKey::PublicDir, "compressed")),
            ffmpeg_path: env::get_or(EnvKey::FfmpegPath, "ffmpeg"),
            ffprobe_path: env::get_or(EnvKey::FfprobePath, "ffprobe"),
            max_upload_bytes: env::get_parsed(EnvKey::MaxUploadBytes, 500 * 1024 * 1024),
            url_expiry: Duration::from_secs(env::get_parsed(EnvKey::UrlExpirySecs, 3600)),
            synthetic_duration: Duration::from_secs(env::get_parsed(
                EnvKey::SyntheticDurationSecs,
                60,
            )),
            storage,
        })
    }

    /// Local-only configuration rooted at `root`, used by tests.
    #[cfg(test)]
    pub fn for_tests(root: &std::path::Path) -> Self {
        Self {
            server_port: 0,
            public_base_url: "http://relay.test/".to_string(),
            staging_dir: root.join("staging"),
            public_dir: root.join("public"),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: root.join("no-ffprobe").to_string_lossy().into_owned(),
            max_upload_bytes: 1024 * 1024,
            url_expiry: Duration::from_secs(3600),
            synthetic_duration: Duration::from_secs(60),
            storage: None,
        }
    }
}

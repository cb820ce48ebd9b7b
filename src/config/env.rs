use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    PublicBaseUrl,
    StagingDir,
    PublicDir,
    FfmpegPath,
    FfprobePath,
    MaxUploadBytes,
    UrlExpirySecs,
    SyntheticDurationSecs,
    StorageBucket,
    StorageEndpoint,
    StorageRegion,
    StorageAccessKey,
    StorageSecretKey,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::PublicBaseUrl => "PUBLIC_BASE_URL",
            EnvKey::StagingDir => "STAGING_DIR",
            EnvKey::PublicDir => "PUBLIC_DIR",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::FfprobePath => "FFPROBE_PATH",
            EnvKey::MaxUploadBytes => "MAX_UPLOAD_BYTES",
            EnvKey::UrlExpirySecs => "URL_EXPIRY_SECS",
            EnvKey::SyntheticDurationSecs => "SYNTHETIC_DURATION_SECS",
            EnvKey::StorageBucket => "STORAGE_BUCKET",
            EnvKey::StorageEndpoint => "STORAGE_ENDPOINT",
            EnvKey::StorageRegion => "STORAGE_REGION",
            EnvKey::StorageAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::StorageSecretKey => "AWS_SECRET_ACCESS_KEY",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

/// Like [`get`], but treats an empty value the same as an unset one.
pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use tracing::info;

use super::{PublishedArtifact, Publisher};
use crate::common::error::PublishError;
use crate::common::upload::{MIN_PART_SIZE, stream_file_to_s3};
use crate::config::settings::StorageConfig;

const VIDEO_CONTENT_TYPE: &str = "video/mp4";

fn storage_error<E>(err: E) -> PublishError
where
    E: std::error::Error,
{
    PublishError::Storage(DisplayErrorContext(&err).to_string())
}

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
    pub bucket: String,
}

impl StorageService {
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint {
            // Custom endpoints (MinIO) need path-style addressing.
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        info!("✅ Object storage client ready (bucket: {})", config.bucket);

        Self {
            client,
            bucket: config.bucket.clone(),
        }
    }

    pub async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), PublishError> {
        let body = ByteStream::from_path(path).await.map_err(storage_error)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(storage_error)?;

        Ok(())
    }

    /// Mints a time-limited, read-only URL for `key`.
    pub async fn presigned_get_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, PublishError> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| PublishError::Url(DisplayErrorContext(&e).to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| PublishError::Url(DisplayErrorContext(&e).to_string()))?;

        Ok(request.uri().to_string())
    }

    pub async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, PublishError> {
        let result = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(storage_error)?;

        result
            .upload_id
            .ok_or_else(|| PublishError::Storage("storage returned no upload id".to_string()))
    }

    pub async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: axum::body::Bytes,
    ) -> Result<aws_sdk_s3::types::CompletedPart, PublishError> {
        let result = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(storage_error)?;

        Ok(aws_sdk_s3::types::CompletedPart::builder()
            .set_e_tag(result.e_tag)
            .part_number(part_number)
            .build())
    }

    pub async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<aws_sdk_s3::types::CompletedPart>,
    ) -> Result<String, PublishError> {
        let completed_multipart_upload = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await
            .map_err(storage_error)?;

        Ok(format!("{}/{}", self.bucket, key))
    }

    pub async fn abort_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<(), PublishError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(storage_error)?;

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadStrategy {
    SinglePut,
    Multipart,
}

impl UploadStrategy {
    /// Artifacts that fit in one part go up with a single `PutObject`.
    fn for_size(size: u64) -> Self {
        if size <= MIN_PART_SIZE as u64 {
            UploadStrategy::SinglePut
        } else {
            UploadStrategy::Multipart
        }
    }
}

/// Publishes artifacts to an S3-compatible bucket and hands out presigned URLs.
pub struct S3Publisher {
    storage: StorageService,
    url_expiry: Duration,
}

impl S3Publisher {
    pub fn new(storage: StorageService, url_expiry: Duration) -> Self {
        Self {
            storage,
            url_expiry,
        }
    }

    fn key_for(name: &str) -> String {
        format!("compressed/{}", name)
    }
}

#[async_trait]
impl Publisher for S3Publisher {
    async fn publish(&self, artifact: &Path, name: &str) -> Result<PublishedArtifact, PublishError> {
        let key = Self::key_for(name);
        let size = tokio::fs::metadata(artifact).await?.len();

        match UploadStrategy::for_size(size) {
            UploadStrategy::SinglePut => {
                self.storage.put_file(&key, artifact, VIDEO_CONTENT_TYPE).await?;
            }
            UploadStrategy::Multipart => {
                stream_file_to_s3(&self.storage, artifact, key.clone(), VIDEO_CONTENT_TYPE).await?;
            }
        }
        info!("⬆️ Uploaded {} bytes to {}/{}", size, self.storage.bucket, key);

        let url = self.storage.presigned_get_url(&key, self.url_expiry).await?;
        Ok(PublishedArtifact { key, url })
    }
}

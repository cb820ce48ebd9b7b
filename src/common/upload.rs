use std::path::Path;

use crate::common::error::{IngestError, PublishError};
use crate::infrastructure::storage::s3::StorageService;
use axum::{body::Bytes, extract::multipart::Field};
use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{error, info};

// Minimum part size for S3 is 5MB. We use 6MB to be safe.
pub const MIN_PART_SIZE: usize = 6 * 1024 * 1024;

/// Streams one multipart field to `path`, returning the number of bytes written.
///
/// The caller owns `path` and is responsible for removing it if this fails.
pub async fn stage_field(mut field: Field<'_>, path: &Path) -> Result<u64, IngestError> {
    let mut file = File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

pub struct MultipartUploader<'a> {
    storage: &'a StorageService,
    key: String,
    upload_id: String,
    parts: Vec<aws_sdk_s3::types::CompletedPart>,
    part_number: i32,
    buffer: Vec<u8>,
}

impl<'a> MultipartUploader<'a> {
    pub async fn new(
        storage: &'a StorageService,
        key: String,
        content_type: &str,
    ) -> Result<Self, PublishError> {
        let upload_id = storage.create_multipart_upload(&key, content_type).await?;

        Ok(Self {
            storage,
            key,
            upload_id,
            parts: Vec::new(),
            part_number: 1,
            buffer: Vec::with_capacity(MIN_PART_SIZE),
        })
    }

    pub async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), PublishError> {
        self.buffer.extend_from_slice(&chunk);

        if self.buffer.len() >= MIN_PART_SIZE {
            self.flush_part().await?;
        }

        Ok(())
    }

    async fn flush_part(&mut self) -> Result<(), PublishError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let body = Bytes::from(std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(MIN_PART_SIZE),
        ));

        let part = self
            .storage
            .upload_part(&self.key, &self.upload_id, self.part_number, body)
            .await?;

        self.parts.push(part);
        self.part_number += 1;

        Ok(())
    }

    pub async fn finish(mut self) -> Result<String, PublishError> {
        if !self.buffer.is_empty() {
            self.flush_part().await?;
        }

        self.storage
            .complete_multipart_upload(&self.key, &self.upload_id, self.parts)
            .await
    }

    pub async fn abort(&self) -> Result<(), PublishError> {
        self.storage
            .abort_multipart_upload(&self.key, &self.upload_id)
            .await
    }
}

/// Streams a file from disk into a multipart upload, aborting the upload on failure.
pub async fn stream_file_to_s3(
    storage: &StorageService,
    path: &Path,
    key: String,
    content_type: &str,
) -> Result<String, PublishError> {
    let file = File::open(path).await?;
    let mut uploader = MultipartUploader::new(storage, key.clone(), content_type).await?;
    let mut stream = ReaderStream::with_capacity(file, 256 * 1024);

    while let Some(chunk) = stream.next().await {
        let result = match chunk {
            Ok(chunk) => uploader.write_chunk(chunk).await,
            Err(e) => Err(PublishError::Io(e)),
        };

        if let Err(e) = result {
            error!("Multipart upload of {} failed: {}", key, e);
            if let Err(abort_err) = uploader.abort().await {
                error!("Failed to abort multipart upload {}: {}", key, abort_err);
            }
            return Err(e);
        }
    }

    let location = uploader.finish().await?;
    info!("⬆️ Multipart upload complete: {}", location);
    Ok(location)
}

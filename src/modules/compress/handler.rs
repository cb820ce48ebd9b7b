use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Multipart, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream};
use tokio::sync::mpsc;
use tracing::info;

use super::events::{self, ProgressEvent};
use super::job::UploadJob;
use super::service::CompressService;
use crate::common::error::IngestError;
use crate::common::response::ApiError;
use crate::common::upload::stage_field;
use crate::state::AppState;

/// Compress Video
/// Accepts a single video file and streams transcode progress as server-sent events.
#[utoipa::path(
    post,
    path = "/compress-video",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Progress stream", content_type = "text/event-stream", body = ProgressEvent),
        (status = 400, description = "No file attached"),
        (status = 413, description = "Upload too large"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Compress"
)]
pub async fn compress_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let job = receive_upload(&state, &mut multipart).await?;
    info!(job_id = %job.id, "📥 Upload staged, starting transcode");

    let (sink, rx) = events::channel();
    tokio::spawn(CompressService::run(state, job, sink));

    Ok(progress_stream(rx))
}

/// Stages the one file field of the request into a fresh job.
async fn receive_upload(state: &AppState, multipart: &mut Multipart) -> Result<UploadJob, IngestError> {
    let mut job: Option<UploadJob> = None;

    while let Some(field) = multipart.next_field().await? {
        let file_name = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };

        if job.is_some() {
            return Err(IngestError::MultipleFiles);
        }

        let staged = UploadJob::new(&state.config.staging_dir, Some(&file_name));
        let bytes = stage_field(field, staged.input_path()).await?;
        if bytes == 0 {
            return Err(IngestError::EmptyFile);
        }

        info!("Staged {} ({} bytes) as {}", file_name, bytes, staged.input_path().display());
        job = Some(staged);
    }

    job.ok_or(IngestError::NoFile)
}

/// Turns a job's event channel into an SSE body that ends right after the terminal event.
fn progress_stream(
    rx: mpsc::Receiver<ProgressEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream::unfold(Some(rx), |rx| async move {
        let mut rx = rx?;
        let event = rx.recv().await?;
        let next = if event.is_terminal() { None } else { Some(rx) };
        Some((Ok(event.to_sse()), next))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

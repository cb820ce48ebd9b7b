use tracing::{Instrument, error, info, info_span};

use super::events::EventSink;
use super::job::{JobState, UploadJob};
use crate::common::error::TranscodeError;
use crate::state::AppState;

pub struct CompressService;

impl CompressService {
    /// Drives one staged upload through encode and publish, reporting on `sink`.
    ///
    /// Staged files are released before the terminal event goes out, and again
    /// by the job's guard on any other exit.
    pub async fn run(state: AppState, job: UploadJob, sink: EventSink) {
        let span = info_span!("job", id = %job.id);
        Self::process(state, job, sink).instrument(span).await
    }

    async fn process(state: AppState, mut job: UploadJob, mut sink: EventSink) {
        sink.started().await;
        job.advance(JobState::Encoding);
        info!("🎥 Encoding {}", job.input_path().display());

        let encoded = state
            .transcoder
            .encode(job.input_path(), job.output_path(), &mut sink)
            .await;
        if let Some(percent) = sink.last_percent() {
            job.record_progress(percent);
        }

        match encoded {
            Ok(()) => {}
            Err(TranscodeError::Cancelled) => {
                info!(
                    "Job abandoned by client while {:?} at {:.1}%",
                    job.state(),
                    job.progress_percent()
                );
                job.advance(JobState::Failed);
                return;
            }
            Err(e) => {
                job.advance(JobState::Failed);
                error!("❌ Encoding failed: {}", e);
                job.release_files();
                sink.failed(e.to_string()).await;
                return;
            }
        }

        if sink.is_closed() {
            job.advance(JobState::Failed);
            info!("Client left before publish, skipping upload");
            return;
        }

        job.advance(JobState::Publishing);
        let name = job.artifact_name();
        let published = state.publisher.publish(job.output_path(), &name).await;
        job.release_files();

        match published {
            Ok(artifact) => {
                job.advance(JobState::Completed);
                info!("✅ Published as {}", artifact.key);
                sink.completed(artifact.url).await;
            }
            Err(e) => {
                job.advance(JobState::Failed);
                error!("❌ Publish failed: {}", e);
                sink.failed(e.to_string()).await;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::modules::compress::events::{self, ProgressEvent};
    use crate::test_support::*;

    async fn staged_job(state: &AppState) -> UploadJob {
        let job = UploadJob::new(&state.config.staging_dir, Some("clip.mov"));
        tokio::fs::write(job.input_path(), b"raw-video").await.unwrap();
        job
    }

    async fn run_to_end(state: AppState) -> Vec<ProgressEvent> {
        let job = staged_job(&state).await;
        let (sink, mut rx) = events::channel();
        tokio::spawn(CompressService::run(state, job, sink));

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event);
        }
        seen
    }

    #[tokio::test]
    async fn successful_job_streams_progress_then_url() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = write_script(tmp.path(), "ffmpeg", ENCODER_OK);
        let ffprobe = write_script(tmp.path(), "ffprobe", PROBE_ONE_SECOND);
        let publisher = Arc::new(RecordingPublisher::default());
        let state = state_with(tmp.path(), &ffmpeg, Some(&ffprobe), publisher.clone());
        let staging = state.config.staging_dir.clone();

        let seen = run_to_end(state).await;

        assert_eq!(seen.first(), Some(&ProgressEvent::Started));
        let percents: Vec<f64> = seen
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress { percent } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![25.0, 50.0]);

        let published = publisher.published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1, b"encoded-bytes");
        match seen.last() {
            Some(ProgressEvent::Completed { compressed_video_url }) => {
                assert!(compressed_video_url.ends_with(&published[0].0));
            }
            other => panic!("expected completed, got {:?}", other),
        }
        assert_eq!(seen.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(leftovers(&staging).is_empty());
    }

    #[tokio::test]
    async fn corrupt_input_reports_encoder_message() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = write_script(tmp.path(), "ffmpeg", ENCODER_BAD_INPUT);
        let publisher = Arc::new(RecordingPublisher::default());
        let state = state_with(tmp.path(), &ffmpeg, None, publisher.clone());
        let staging = state.config.staging_dir.clone();

        let seen = run_to_end(state).await;

        assert_eq!(seen.first(), Some(&ProgressEvent::Started));
        match seen.last() {
            Some(ProgressEvent::Error { error }) => {
                assert!(error.contains("Invalid data found"), "{error}");
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(seen.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(publisher.published.lock().unwrap().is_empty());
        assert!(leftovers(&staging).is_empty());
    }

    #[tokio::test]
    async fn undecodable_encoder_output_still_completes() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = write_script(tmp.path(), "ffmpeg", ENCODER_BINARY_NOISE);
        let publisher = Arc::new(RecordingPublisher::default());
        let state = state_with(tmp.path(), &ffmpeg, None, publisher.clone());
        let staging = state.config.staging_dir.clone();

        let seen = tokio::time::timeout(Duration::from_secs(10), run_to_end(state))
            .await
            .expect("stream should reach a terminal event");

        assert!(matches!(seen.last(), Some(ProgressEvent::Completed { .. })), "{seen:?}");
        assert_eq!(seen.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(publisher.published.lock().unwrap().len(), 1);
        assert!(leftovers(&staging).is_empty());
    }

    #[tokio::test]
    async fn clean_exit_without_output_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = write_script(tmp.path(), "ffmpeg", ENCODER_NO_OUTPUT);
        let publisher = Arc::new(RecordingPublisher::default());
        let state = state_with(tmp.path(), &ffmpeg, None, publisher.clone());
        let staging = state.config.staging_dir.clone();

        let seen = run_to_end(state).await;

        match seen.last() {
            Some(ProgressEvent::Error { error }) => {
                assert!(error.contains("without producing an output file"), "{error}");
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert!(publisher.published.lock().unwrap().is_empty());
        assert!(leftovers(&staging).is_empty());
    }

    #[tokio::test]
    async fn missing_encoder_binary_fails_the_job() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("no-such-ffmpeg");
        let state = state_with(tmp.path(), &missing, None, Arc::new(RecordingPublisher::default()));
        let staging = state.config.staging_dir.clone();

        let seen = run_to_end(state).await;

        assert!(matches!(seen.last(), Some(ProgressEvent::Error { .. })));
        assert!(leftovers(&staging).is_empty());
    }

    #[tokio::test]
    async fn unreachable_storage_fails_after_encoding() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = write_script(tmp.path(), "ffmpeg", ENCODER_OK);
        let state = state_with(tmp.path(), &ffmpeg, None, Arc::new(UnreachablePublisher));
        let staging = state.config.staging_dir.clone();

        let seen = run_to_end(state).await;

        assert_eq!(seen.first(), Some(&ProgressEvent::Started));
        assert!(!seen.iter().any(|e| matches!(e, ProgressEvent::Completed { .. })));
        match seen.last() {
            Some(ProgressEvent::Error { error }) => assert!(error.contains("connection refused"), "{error}"),
            other => panic!("expected error, got {:?}", other),
        }
        assert!(leftovers(&staging).is_empty());
    }

    #[tokio::test]
    async fn same_input_twice_gets_distinct_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = write_script(tmp.path(), "ffmpeg", ENCODER_OK);
        let publisher = Arc::new(RecordingPublisher::default());
        let state = state_with(tmp.path(), &ffmpeg, None, publisher.clone());

        let first = run_to_end(state.clone()).await;
        let second = run_to_end(state).await;

        let url = |events: &[ProgressEvent]| match events.last() {
            Some(ProgressEvent::Completed { compressed_video_url }) => compressed_video_url.clone(),
            other => panic!("expected completed, got {:?}", other),
        };
        assert_ne!(url(&first), url(&second));

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 2);
        assert_ne!(published[0].0, published[1].0);
    }

    #[tokio::test]
    async fn client_disconnect_stops_encoder_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let ffmpeg = write_script(tmp.path(), "ffmpeg", ENCODER_HANGS);
        let publisher = Arc::new(RecordingPublisher::default());
        let state = state_with(tmp.path(), &ffmpeg, None, publisher.clone());
        let staging = state.config.staging_dir.clone();

        let job = staged_job(&state).await;
        let (sink, mut rx) = events::channel();
        let task = tokio::spawn(CompressService::run(state, job, sink));

        assert_eq!(rx.recv().await, Some(ProgressEvent::Started));
        drop(rx);

        tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .expect("job should stop once the client leaves")
            .unwrap();
        assert!(publisher.published.lock().unwrap().is_empty());
        assert!(leftovers(&staging).is_empty());
    }
}

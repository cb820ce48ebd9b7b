use axum::response::sse::Event;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error};
use utoipa::ToSchema;

const CHANNEL_CAPACITY: usize = 32;

/// One frame on a job's progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProgressEvent {
    Started,
    Progress {
        percent: f64,
    },
    Completed {
        #[serde(rename = "compressedVideoUrl")]
        compressed_video_url: String,
    },
    Error {
        error: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Completed { .. } | ProgressEvent::Error { .. })
    }

    pub fn to_sse(&self) -> Event {
        Event::default().json_data(self).unwrap_or_else(|e| {
            error!("Failed to encode progress event: {}", e);
            Event::default().data(r#"{"status":"error","error":"failed to encode event"}"#)
        })
    }
}

pub fn channel() -> (EventSink, mpsc::Receiver<ProgressEvent>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (EventSink::new(tx), rx)
}

/// Write side of a job's progress stream.
///
/// Events leave in the order `started`, non-decreasing `progress`, then one
/// terminal event. The terminal methods consume the sink, which closes the
/// stream. A sink dropped without a terminal event emits `error` instead.
#[derive(Debug)]
pub struct EventSink {
    tx: mpsc::Sender<ProgressEvent>,
    started: bool,
    last_percent: Option<f64>,
    finished: bool,
}

impl EventSink {
    fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            tx,
            started: false,
            last_percent: None,
            finished: false,
        }
    }

    pub async fn started(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.send(ProgressEvent::Started).await;
    }

    /// Queues a progress update. Values are rounded to one decimal place and
    /// anything not above the last reported value is dropped. A slow reader
    /// loses intermediate updates rather than stalling the encoder.
    ///
    /// The last free slot of the channel is never used for progress, so the
    /// terminal event always fits, including the one sent from `Drop`.
    pub async fn progress(&mut self, percent: f64) {
        if !self.started {
            self.started().await;
        }

        let percent = (percent.clamp(0.0, 100.0) * 10.0).round() / 10.0;
        if self.last_percent.is_some_and(|last| percent <= last) {
            return;
        }
        if self.tx.capacity() <= 1 {
            debug!("Reader is behind, skipping progress {:.1}%", percent);
            return;
        }
        self.last_percent = Some(percent);

        if let Err(e) = self.tx.try_send(ProgressEvent::Progress { percent }) {
            debug!("Dropped progress update: {}", e);
        }
    }

    pub async fn completed(mut self, url: String) {
        self.finished = true;
        self.send(ProgressEvent::Completed {
            compressed_video_url: url,
        })
        .await;
    }

    pub async fn failed(mut self, message: String) {
        self.finished = true;
        self.send(ProgressEvent::Error { error: message }).await;
    }

    pub fn last_percent(&self) -> Option<f64> {
        self.last_percent
    }

    /// Whether the reading side (the client connection) has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Handle that resolves once the client has gone away.
    pub fn watcher(&self) -> ClosedWatcher {
        ClosedWatcher(self.tx.clone())
    }

    async fn send(&self, event: ProgressEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("Progress stream closed by client");
        }
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.tx.try_send(ProgressEvent::Error {
                error: "Job ended unexpectedly".to_string(),
            });
        }
    }
}

pub struct ClosedWatcher(mpsc::Sender<ProgressEvent>);

impl ClosedWatcher {
    pub async fn closed(&self) {
        self.0.closed().await
    }
}

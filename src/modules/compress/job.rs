use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Received,
    Encoding,
    Publishing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn can_advance_to(self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Received, JobState::Encoding) => true,
            (JobState::Encoding, JobState::Publishing) => true,
            (JobState::Publishing, JobState::Completed) => true,
            (from, JobState::Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Staged input and output files for one job. Both are removed when the
/// guard is dropped, whatever state the job ended in.
#[derive(Debug)]
pub struct StagedFiles {
    input: PathBuf,
    output: PathBuf,
}

impl StagedFiles {
    /// Reserves collision-free paths in `staging_dir`. Nothing is created on disk.
    pub fn allocate(staging_dir: &Path, original_name: Option<&str>) -> Self {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let suffix: u32 = rand::rng().random();
        let stem = format!("{}-{:08x}", millis, suffix);
        let ext = original_name.map(sanitized_extension).unwrap_or_else(|| "bin".to_string());

        Self {
            input: staging_dir.join(format!("{}-input.{}", stem, ext)),
            output: staging_dir.join(format!("{}-output.mp4", stem)),
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Removes both files. Files that are already gone are not an error.
    pub fn cleanup(&self) {
        remove_quietly(&self.input);
        remove_quietly(&self.output);
    }
}

impl Drop for StagedFiles {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("🧹 Removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove staged file {}: {}", path.display(), e),
    }
}

fn sanitized_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

/// One in-flight transcode request, owned by the task that processes it.
#[derive(Debug)]
pub struct UploadJob {
    pub id: Uuid,
    files: StagedFiles,
    state: JobState,
    progress_percent: f64,
}

impl UploadJob {
    pub fn new(staging_dir: &Path, original_name: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            files: StagedFiles::allocate(staging_dir, original_name),
            state: JobState::Received,
            progress_percent: 0.0,
        }
    }

    pub fn input_path(&self) -> &Path {
        self.files.input()
    }

    pub fn output_path(&self) -> &Path {
        self.files.output()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn progress_percent(&self) -> f64 {
        self.progress_percent
    }

    /// Name the published artifact is stored under.
    pub fn artifact_name(&self) -> String {
        format!("{}.mp4", self.id)
    }

    /// Moves to `next`; invalid transitions are ignored and reported as `false`.
    pub fn advance(&mut self, next: JobState) -> bool {
        if !self.state.can_advance_to(next) {
            warn!("Job {} cannot move from {:?} to {:?}", self.id, self.state, next);
            return false;
        }
        self.state = next;
        if next == JobState::Completed {
            self.progress_percent = 100.0;
        }
        true
    }

    pub fn record_progress(&mut self, percent: f64) {
        self.progress_percent = percent.clamp(0.0, 100.0).max(self.progress_percent);
    }

    /// Releases the staged files ahead of the terminal event.
    pub fn release_files(&self) {
        self.files.cleanup();
    }
}

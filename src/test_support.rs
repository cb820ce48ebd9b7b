//! Fakes shared by the pipeline and route tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::common::error::PublishError;
use crate::config::settings::AppConfig;
use crate::infrastructure::storage::{PublishedArtifact, Publisher};
use crate::state::AppState;
use crate::workers::transcoder::Transcoder;

/// Encoder stand-in: reports two progress blocks and writes the output file.
pub const ENCODER_OK: &str = r#"for last; do :; done
echo "frame=1"
echo "out_time_us=250000"
echo "progress=continue"
echo "out_time_us=500000"
echo "progress=continue"
printf 'encoded-bytes' > "$last"
echo "progress=end"
"#;

/// Encoder stand-in that rejects its input the way ffmpeg does.
pub const ENCODER_BAD_INPUT: &str = r#"echo "[in#0] Error opening input: Invalid data found when processing input" >&2
exit 1
"#;

/// Encoder stand-in whose progress output starts with bytes that are not
/// UTF-8, followed by more than a pipe buffer of output.
pub const ENCODER_BINARY_NOISE: &str = r#"for last; do :; done
printf '\377\376\n'
head -c 400000 /dev/zero | tr '\0' a
echo
echo "out_time_us=250000"
echo "progress=continue"
printf 'encoded-bytes' > "$last"
echo "progress=end"
"#;

/// Encoder stand-in that exits cleanly without writing anything.
pub const ENCODER_NO_OUTPUT: &str = r#"echo "progress=end"
exit 0
"#;

/// Encoder stand-in that never finishes on its own.
pub const ENCODER_HANGS: &str = "exec sleep 30\n";

/// Probe stand-in reporting a one second source.
pub const PROBE_ONE_SECOND: &str = r#"echo '{"format":{"duration":"1.000000"}}'
"#;

#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Stores artifacts in memory and hands out predictable URLs.
#[derive(Default)]
pub struct RecordingPublisher {
    pub published: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, artifact: &Path, name: &str) -> Result<PublishedArtifact, PublishError> {
        let bytes = tokio::fs::read(artifact).await?;
        self.published
            .lock()
            .unwrap()
            .push((name.to_string(), bytes));
        Ok(PublishedArtifact {
            key: name.to_string(),
            url: format!("https://storage.test/compressed/{}", name),
        })
    }
}

/// Behaves like unreachable object storage.
pub struct UnreachablePublisher;

#[async_trait]
impl Publisher for UnreachablePublisher {
    async fn publish(&self, _artifact: &Path, _name: &str) -> Result<PublishedArtifact, PublishError> {
        Err(PublishError::Storage("dispatch failure: connection refused".to_string()))
    }
}

/// State rooted at `root` using the given encoder/probe scripts.
pub fn state_with(
    root: &Path,
    ffmpeg: &Path,
    ffprobe: Option<&Path>,
    publisher: Arc<dyn Publisher>,
) -> AppState {
    let mut config = AppConfig::for_tests(root);
    config.ffmpeg_path = ffmpeg.to_string_lossy().into_owned();
    if let Some(ffprobe) = ffprobe {
        config.ffprobe_path = ffprobe.to_string_lossy().into_owned();
    }
    std::fs::create_dir_all(&config.staging_dir).unwrap();

    let transcoder = Transcoder::new(&config);
    AppState::new(config, transcoder, publisher)
}

/// Files currently left in `dir`.
pub fn leftovers(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok().map(|e| e.path())).collect(),
        Err(_) => Vec::new(),
    }
}

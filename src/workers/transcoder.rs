use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::common::error::TranscodeError;
use crate::config::settings::AppConfig;
use crate::modules::compress::events::EventSink;
use crate::workers::progress::{ProgressEstimator, ProgressParser};

const STDERR_TAIL_LINES: usize = 5;

/// Fixed output profile: H.264 baseline for broad device support, bounded
/// frame rate, AAC audio and the moov atom up front for progressive playback.
const OUTPUT_PROFILE: &[&str] = &[
    "-c:v", "libx264",
    "-profile:v", "baseline",
    "-level", "3.0",
    "-pix_fmt", "yuv420p",
    "-preset", "fast",
    "-crf", "28",
    "-fpsmax", "30",
    "-c:a", "aac",
    "-b:a", "128k",
    "-movflags", "+faststart",
];

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg_path: String,
    ffprobe_path: String,
    assumed_duration: Duration,
}

impl Transcoder {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            assumed_duration: config.synthetic_duration,
        }
    }

    /// Source duration from the metadata probe, if it can be determined.
    pub async fn probe_duration(&self, input: &Path) -> Option<Duration> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet"])
            .args(["-print_format", "json"])
            .arg("-show_format")
            .arg(input)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                debug!("Probe exited with {}", output.status);
                return None;
            }
            Err(e) => {
                warn!("Failed to run {}: {}", self.ffprobe_path, e);
                return None;
            }
        };

        parse_probe_duration(&output.stdout)
    }

    /// Encodes `input` into `output`, reporting progress through `sink`.
    ///
    /// Returns once the encoder has exited and the output file exists. If the
    /// client goes away mid-encode the encoder is killed and
    /// [`TranscodeError::Cancelled`] is returned.
    pub async fn encode(
        &self,
        input: &Path,
        output: &Path,
        sink: &mut EventSink,
    ) -> Result<(), TranscodeError> {
        let total = self.probe_duration(input).await;
        match total {
            Some(d) => info!("🎬 Source duration {:.1}s", d.as_secs_f64()),
            None => info!("🎬 Source duration unknown, using estimated progress"),
        }

        let mut child = Command::new(&self.ffmpeg_path)
            .args(encode_args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                program: self.ffmpeg_path.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TranscodeError::Io(std::io::Error::other("encoder stdout not captured")))?;
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(stderr_tail(stderr)));

        let watcher = sink.watcher();
        let mut lines = LossyLines::new(stdout);
        let mut parser = ProgressParser::new();
        let mut estimator = ProgressEstimator::new(total, self.assumed_duration);

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(block) = parser.feed_line(&line) {
                            if block.end {
                                continue;
                            }
                            let percent = estimator.estimate(&block.sample);
                            debug!("Encode progress {:.1}%", percent);
                            sink.progress(percent).await;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read encoder progress: {}", e);
                        break;
                    }
                },
                _ = watcher.closed() => {
                    warn!("Client disconnected, stopping encoder");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    return Err(TranscodeError::Cancelled);
                }
            }
        }
        // Closing our end makes a still-writing encoder exit instead of blocking on the pipe.
        drop(lines);

        let exited = tokio::select! {
            status = child.wait() => Some(status?),
            _ = watcher.closed() => None,
        };
        let Some(status) = exited else {
            warn!("Client disconnected, stopping encoder");
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(TranscodeError::Cancelled);
        };

        let tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        if !status.success() {
            let message = if tail.is_empty() {
                "no diagnostic output".to_string()
            } else {
                tail.join("; ")
            };
            return Err(TranscodeError::Failed {
                program: self.ffmpeg_path.clone(),
                status: status.to_string(),
                message,
            });
        }

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(TranscodeError::MissingOutput);
        }

        Ok(())
    }
}

fn encode_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-nostats", "-y", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(input.as_os_str().to_owned());
    args.extend(OUTPUT_PROFILE.iter().map(OsString::from));
    args.extend(["-progress", "pipe:1"].iter().map(OsString::from));
    args.push(output.as_os_str().to_owned());
    args
}

fn parse_probe_duration(stdout: &[u8]) -> Option<Duration> {
    let probe: ProbeOutput = serde_json::from_slice(stdout).ok()?;
    let secs: f64 = probe.format?.duration?.parse().ok()?;
    if secs <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

/// Line reader that replaces invalid UTF-8 instead of failing, so a pipe is
/// always drained to EOF.
struct LossyLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LossyLines<R> {
    fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}

/// Collects the last few non-empty stderr lines for error reporting.
async fn stderr_tail<R>(stderr: R) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut lines = LossyLines::new(stderr);
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        debug!(target: "video_relay::encoder", "{}", line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line.to_string());
    }

    tail.into()
}

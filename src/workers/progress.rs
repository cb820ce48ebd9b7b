//! Progress estimation for encoder runs.
//!
//! The encoder's `-progress` stream is a sequence of `key=value` lines grouped
//! into blocks, each block terminated by a `progress=continue|end` line.
//! [`ProgressParser`] turns those lines into [`ProgressSample`]s and
//! [`ProgressEstimator`] maps samples to a percentage using three tiers:
//! a percentage reported by the tool, encoded time against the probed
//! duration, and finally wall-clock time against an assumed duration.

use std::time::{Duration, Instant};

/// Highest value tiers 2 and 3 may report before the tool signals completion.
pub const PENDING_CAP: f64 = 99.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSample {
    /// Percentage reported directly by the tool, if it reports one.
    pub percent: Option<f64>,
    /// Position of the encoder in the output timeline.
    pub out_time: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressBlock {
    pub sample: ProgressSample,
    /// The tool flagged this block as its last one (`progress=end`).
    pub end: bool,
}

#[derive(Debug, Default)]
pub struct ProgressParser {
    current: ProgressSample,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line of tool output; returns a block once it is complete.
    pub fn feed_line(&mut self, line: &str) -> Option<ProgressBlock> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key.trim() {
            "percent" => self.current.percent = value.parse::<f64>().ok().filter(|p| p.is_finite()),
            // ffmpeg reports both of these in microseconds.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    if us >= 0 {
                        self.current.out_time = Some(Duration::from_micros(us as u64));
                    }
                }
            }
            "out_time" => {
                if self.current.out_time.is_none() {
                    self.current.out_time = parse_timestamp(value);
                }
            }
            "progress" => {
                let sample = std::mem::take(&mut self.current);
                return Some(ProgressBlock {
                    sample,
                    end: value == "end",
                });
            }
            _ => {}
        }

        None
    }
}

/// Parses `HH:MM:SS(.frac)` into a duration. Negative or malformed values yield `None`.
pub fn parse_timestamp(value: &str) -> Option<Duration> {
    let mut parts = value.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let whole = hours.checked_mul(3600)?.checked_add(minutes.checked_mul(60)?)?;
    let fraction = Duration::try_from_secs_f64(seconds).ok()?;
    Duration::from_secs(whole).checked_add(fraction)
}

/// Tier 1: the tool's own percentage.
fn reported(sample: &ProgressSample) -> Option<f64> {
    sample.percent
}

/// Tier 2: encoded time against the probed duration.
fn from_duration(sample: &ProgressSample, total: Option<Duration>) -> Option<f64> {
    let total = total.filter(|t| !t.is_zero())?;
    let done = sample.out_time?;
    Some((done.as_secs_f64() / total.as_secs_f64() * 100.0).min(PENDING_CAP))
}

/// Tier 3: wall-clock heuristic against an assumed worst-case duration.
fn synthetic(elapsed: Duration, assumed: Duration) -> f64 {
    if assumed.is_zero() {
        return PENDING_CAP;
    }
    (elapsed.as_secs_f64() / assumed.as_secs_f64() * 100.0).min(PENDING_CAP)
}

#[derive(Debug)]
pub struct ProgressEstimator {
    total: Option<Duration>,
    assumed: Duration,
    started: Instant,
    last: f64,
}

impl ProgressEstimator {
    pub fn new(total: Option<Duration>, assumed: Duration) -> Self {
        Self {
            total,
            assumed,
            started: Instant::now(),
            last: 0.0,
        }
    }

    pub fn estimate(&mut self, sample: &ProgressSample) -> f64 {
        let elapsed = self.started.elapsed();
        self.estimate_at(sample, elapsed)
    }

    fn estimate_at(&mut self, sample: &ProgressSample, elapsed: Duration) -> f64 {
        let raw = reported(sample)
            .or_else(|| from_duration(sample, self.total))
            .unwrap_or_else(|| synthetic(elapsed, self.assumed));

        let pct = raw.clamp(0.0, 100.0).max(self.last);
        self.last = pct;
        pct
    }
}

//! Lyric lines and the LRC-file lyrics source.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LyricsError {
    #[error("lyrics not found")]
    NotFound,

    #[error("failed to read lyrics: {0}")]
    Io(#[from] io::Error),
}

/// One lyric line with its start time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LyricLine {
    /// Start of the line in milliseconds.
    #[serde(default)]
    pub time_ms: u64,
    #[serde(default)]
    pub words: String,
}

impl LyricLine {
    pub fn new(time_ms: u64, words: impl Into<String>) -> Self {
        Self {
            time_ms,
            words: words.into(),
        }
    }
}

/// Plain (unsynced) lyrics come back with every timestamp at zero.
pub fn timesynced(lines: &[LyricLine]) -> bool {
    lines.len() > 1 && lines[1].time_ms != 0
}

/// Index of the last line that starts at or before `position_ms`.
pub fn current_index(lines: &[LyricLine], position_ms: u64) -> usize {
    lines
        .partition_point(|line| line.time_ms <= position_ms)
        .saturating_sub(1)
}

/// Parses LRC text (`[mm:ss.xx] words`). Tag lines such as `[ar:Artist]` are
/// skipped and lines with several timestamps are repeated for each of them.
pub fn parse_lrc(content: &str) -> Vec<LyricLine> {
    let mut lines = Vec::new();

    for raw in content.lines() {
        let mut rest = raw.trim();
        if rest.is_empty() {
            continue;
        }

        let mut stamps = Vec::new();
        while let Some(tail) = rest.strip_prefix('[') {
            let Some(close) = tail.find(']') else {
                break;
            };
            let tag = &tail[..close];
            rest = tail[close + 1..].trim_start();
            match parse_timestamp(tag) {
                Some(ms) => stamps.push(ms),
                None => debug!("Skipping LRC tag [{}]", tag),
            }
        }

        if stamps.is_empty() {
            if !raw.trim_start().starts_with('[') {
                lines.push(LyricLine::new(0, rest));
            }
            continue;
        }

        for ms in stamps {
            lines.push(LyricLine::new(ms, rest.trim_end()));
        }
    }

    lines.sort_by_key(|line| line.time_ms);
    lines
}

fn parse_timestamp(tag: &str) -> Option<u64> {
    let (minutes, seconds) = tag.split_once(':')?;
    let minutes: u64 = minutes.trim().parse().ok()?;
    let seconds: f64 = seconds.trim().parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let millis = (seconds * 1000.0).round();
    if millis >= u64::MAX as f64 {
        return None;
    }
    minutes.checked_mul(60_000)?.checked_add(millis as u64)
}

/// Looks up lyrics for the track described by `id` and `query`.
pub trait LyricsProvider: Send + Sync {
    fn lyrics(&self, id: &str, query: &str) -> Result<Vec<LyricLine>, LyricsError>;

    fn name(&self) -> &'static str;
}

/// Reads `<directory>/<query>.lrc`, falling back to `<directory>/<id>.lrc`.
pub struct LrcDirectoryProvider {
    directory: PathBuf,
}

impl LrcDirectoryProvider {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    fn candidate(&self, key: &str) -> Option<PathBuf> {
        let name: String = key
            .trim()
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        if name.is_empty() {
            return None;
        }
        Some(self.directory.join(format!("{name}.lrc")))
    }
}

impl LyricsProvider for LrcDirectoryProvider {
    fn lyrics(&self, id: &str, query: &str) -> Result<Vec<LyricLine>, LyricsError> {
        for path in [self.candidate(query), self.candidate(id)].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let content = fs::read_to_string(&path).map_err(|e| {
                warn!("Failed to read {}: {}", path.display(), e);
                LyricsError::Io(e)
            })?;
            let lines = parse_lrc(&content);
            if lines.is_empty() {
                continue;
            }
            debug!("Loaded {} lyric lines from {}", lines.len(), path.display());
            return Ok(lines);
        }
        Err(LyricsError::NotFound)
    }

    fn name(&self) -> &'static str {
        "lrc_directory"
    }
}

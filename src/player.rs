//! Player state sources.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("failed to read player state from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("player request failed: {0}")]
    Request(String),

    #[error("failed to parse player state: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Snapshot of what the player is doing right now.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerState {
    /// Identifier of the current track.
    pub id: String,
    /// String usable to look up lyrics.
    pub query: String,
    /// Playback position in milliseconds.
    pub position: u64,
    pub playing: bool,
    pub now_playing: String,
    pub artists: Vec<String>,
    pub pic_url: String,
}

pub trait Player: Send {
    fn state(&self) -> Result<PlayerState, PlayerError>;
}

/// Reads a JSON-encoded [`PlayerState`] from a file on every poll.
pub struct FilePlayer {
    path: PathBuf,
}

impl FilePlayer {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl Player for FilePlayer {
    fn state(&self) -> Result<PlayerState, PlayerError> {
        let data = fs::read_to_string(&self.path).map_err(|source| PlayerError::Read {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// Fetches a JSON-encoded [`PlayerState`] over HTTP.
///
/// The credential, when present, is sent verbatim as the `Cookie` header.
pub struct HttpPlayer {
    agent: ureq::Agent,
    url: String,
    cookie: Option<String>,
}

impl HttpPlayer {
    pub fn new(url: impl Into<String>, cookie: Option<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url: url.into(),
            cookie: cookie.filter(|c| !c.is_empty()),
        }
    }
}

impl Player for HttpPlayer {
    fn state(&self) -> Result<PlayerState, PlayerError> {
        debug!("GET player state {}", self.url);

        let mut request = self.agent.get(&self.url);
        if let Some(cookie) = &self.cookie {
            request = request.set("Cookie", cookie);
        }

        let body = request
            .call()
            .map_err(|e| PlayerError::Request(e.to_string()))?
            .into_string()
            .map_err(|e| PlayerError::Request(e.to_string()))?;
        Ok(serde_json::from_str(&body)?)
    }
}

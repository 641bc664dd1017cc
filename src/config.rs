use anyhow::Context;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    artwork::{DEFAULT_ARTWORK_SIZE, DEFAULT_FETCH_TIMEOUT},
    chunk::{DEFAULT_GRID_ROWS, DEFAULT_ROW_BUDGET},
    pool::{PoolOptions, DEFAULT_TIMER_INTERVAL, DEFAULT_UPDATE_INTERVAL},
    reconciler::{DisplayMode, LayoutOptions},
    wrap::WrapPolicy,
};

pub const COOKIE_ENV: &str = "SPOTIFY_COOKIE";

const MIN_INTERVAL: Duration = Duration::from_millis(10);
const MIN_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_PLAYER_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Config {
    pub ignore_errors: bool,
    pub cookie: Option<String>,
    pub pipe: PipeConfig,
    pub display: DisplayConfig,
    pub artwork: ArtworkConfig,
    pub player: PlayerConfig,
    pub lyrics: LyricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        ConfigDocument::default().into()
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub mode: Option<String>,
    pub cookie: Option<String>,
    pub verbose: bool,
    pub player_file: Option<PathBuf>,
    pub player_url: Option<String>,
    pub lyrics_dir: Option<PathBuf>,
}

impl Config {
    /// Loads `explicit` if given, otherwise the first config file found next
    /// to the working directory or the executable. No file means defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let mut candidates = Vec::new();

        if let Ok(current_dir) = env::current_dir() {
            candidates.push(current_dir.join("config.toml"));
            candidates.push(current_dir.join("config").join("config.toml"));
            candidates.push(current_dir.join("config").join("nowplaying.toml"));
        }

        if let Ok(exe) = env::current_exe() {
            if let Some(dir) = exe.parent() {
                candidates.push(dir.join("config.toml"));
                candidates.push(dir.join("config").join("config.toml"));
                candidates.push(dir.join("config").join("nowplaying.toml"));
            }
        }

        for path in candidates {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(Config::default())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn parse(data: &str) -> anyhow::Result<Self> {
        let doc: ConfigDocument = toml::from_str(data)?;
        Ok(doc.into())
    }

    /// Applies CLI values, then the credential from `env_cookie` when no
    /// flag supplied one.
    pub fn apply_overrides(&mut self, overrides: Overrides, env_cookie: Option<String>) {
        if let Some(mode) = overrides.mode {
            self.display.mode = DisplayMode::from_name(&mode);
        }
        if let Some(cookie) = overrides.cookie.or(env_cookie).filter(|c| !c.is_empty()) {
            self.cookie = Some(cookie);
        }
        if overrides.verbose {
            self.ignore_errors = false;
        }
        if let Some(path) = overrides.player_file {
            self.player.source = PlayerSource::File;
            self.player.path = path;
        }
        if let Some(url) = overrides.player_url {
            self.player.source = PlayerSource::Http;
            self.player.url = url;
        }
        if let Some(dir) = overrides.lyrics_dir {
            self.lyrics.directory = Some(dir);
        }
    }

    pub fn layout(&self) -> LayoutOptions {
        LayoutOptions {
            mode: self.display.mode,
            policy: self.pipe.overflow,
            width: self.pipe.length,
            row_budget: self.display.row_budget,
            rows: self.display.rows,
        }
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            update_interval: self.player.update_interval,
            timer_interval: self.player.timer_interval,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipeConfig {
    pub length: usize,
    pub overflow: WrapPolicy,
}

#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub mode: DisplayMode,
    pub row_budget: usize,
    pub rows: usize,
}

#[derive(Debug, Clone)]
pub struct ArtworkConfig {
    pub size: u32,
    pub timeout: Duration,
    pub blocking: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSource {
    File,
    Http,
}

impl PlayerSource {
    fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "http" => PlayerSource::Http,
            _ => PlayerSource::File,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub source: PlayerSource,
    pub path: PathBuf,
    pub url: String,
    /// Per-request timeout for the HTTP source.
    pub timeout: Duration,
    pub update_interval: Duration,
    pub timer_interval: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct LyricsConfig {
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    ignore_errors: Option<bool>,
    cookie: Option<String>,
    #[serde(default)]
    pipe: PipeSection,
    #[serde(default)]
    display: DisplaySection,
    #[serde(default)]
    artwork: ArtworkSection,
    #[serde(default)]
    player: PlayerSection,
    #[serde(default)]
    lyrics: LyricsSection,
}

fn millis_at_least(value: Option<u64>, default: Duration, min: Duration) -> Duration {
    value.map(Duration::from_millis).unwrap_or(default).max(min)
}

impl From<ConfigDocument> for Config {
    fn from(value: ConfigDocument) -> Self {
        let pipe = PipeConfig {
            length: value.pipe.length.unwrap_or(0),
            overflow: value
                .pipe
                .overflow
                .as_deref()
                .map(WrapPolicy::from_name)
                .unwrap_or_default(),
        };

        let display = DisplayConfig {
            mode: value
                .display
                .mode
                .as_deref()
                .map(DisplayMode::from_name)
                .unwrap_or_default(),
            row_budget: value.display.row_budget.unwrap_or(DEFAULT_ROW_BUDGET).max(1),
            rows: value.display.rows.unwrap_or(DEFAULT_GRID_ROWS).max(1),
        };

        let artwork = ArtworkConfig {
            size: value.artwork.size.unwrap_or(DEFAULT_ARTWORK_SIZE).max(1),
            timeout: value
                .artwork
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_FETCH_TIMEOUT)
                .max(MIN_TIMEOUT),
            blocking: value.artwork.blocking.unwrap_or(false),
        };

        let player = PlayerConfig {
            source: value
                .player
                .source
                .as_deref()
                .map(PlayerSource::from_name)
                .unwrap_or(PlayerSource::File),
            path: value
                .player
                .path
                .unwrap_or_else(|| PathBuf::from("now_playing.json")),
            url: value.player.url.unwrap_or_default(),
            timeout: value
                .player
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_PLAYER_TIMEOUT)
                .max(MIN_TIMEOUT),
            update_interval: millis_at_least(
                value.player.update_interval_ms,
                DEFAULT_UPDATE_INTERVAL,
                MIN_INTERVAL,
            ),
            timer_interval: millis_at_least(
                value.player.timer_interval_ms,
                DEFAULT_TIMER_INTERVAL,
                MIN_INTERVAL,
            ),
        };

        let lyrics = LyricsConfig {
            directory: value
                .lyrics
                .directory
                .filter(|dir| !dir.as_os_str().is_empty()),
        };

        Config {
            ignore_errors: value.ignore_errors.unwrap_or(true),
            cookie: value.cookie.filter(|c| !c.is_empty()),
            pipe,
            display,
            artwork,
            player,
            lyrics,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PipeSection {
    length: Option<usize>,
    overflow: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DisplaySection {
    mode: Option<String>,
    row_budget: Option<usize>,
    rows: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ArtworkSection {
    size: Option<u32>,
    timeout_secs: Option<u64>,
    blocking: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct PlayerSection {
    source: Option<String>,
    path: Option<PathBuf>,
    url: Option<String>,
    timeout_secs: Option<u64>,
    update_interval_ms: Option<u64>,
    timer_interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LyricsSection {
    directory: Option<PathBuf>,
}

//! Producer side of the update queue: polls the player, keeps lyrics for the
//! current track and emits one [`Update`] per timer tick.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use crate::{
    lyrics::{current_index, LyricLine, LyricsError, LyricsProvider},
    player::{Player, PlayerState},
};

pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_TIMER_INTERVAL: Duration = Duration::from_millis(200);

/// What the reconciler consumes once per tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Update {
    pub err: Option<String>,
    pub artists: Vec<String>,
    pub now_playing: String,
    pub pic_url: String,
    pub lines: Option<Arc<Vec<LyricLine>>>,
    pub index: usize,
}

impl Update {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            err: Some(message.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    /// How often the player is asked for fresh state.
    pub update_interval: Duration,
    /// How often an update is emitted; positions are interpolated in between.
    pub timer_interval: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            update_interval: DEFAULT_UPDATE_INTERVAL,
            timer_interval: DEFAULT_TIMER_INTERVAL,
        }
    }
}

/// Polling state between ticks.
pub struct Listener<'a> {
    player: &'a dyn Player,
    provider: Option<&'a dyn LyricsProvider>,
    options: PoolOptions,
    state: Option<PlayerState>,
    anchor: Instant,
    last_poll: Option<Instant>,
    track_id: Option<String>,
    lines: Option<Arc<Vec<LyricLine>>>,
}

impl<'a> Listener<'a> {
    pub fn new(
        player: &'a dyn Player,
        provider: Option<&'a dyn LyricsProvider>,
        options: PoolOptions,
    ) -> Self {
        Self {
            player,
            provider,
            options,
            state: None,
            anchor: Instant::now(),
            last_poll: None,
            track_id: None,
            lines: None,
        }
    }

    /// Produces the updates for one tick at time `now`.
    pub fn tick(&mut self, now: Instant) -> Vec<Update> {
        let mut updates = Vec::new();

        let poll_due = self
            .last_poll
            .map_or(true, |last| now.duration_since(last) >= self.options.update_interval);
        if poll_due {
            self.last_poll = Some(now);
            match self.player.state() {
                Ok(state) => {
                    self.refresh_lyrics(&state);
                    self.state = Some(state);
                    self.anchor = now;
                }
                Err(err) => updates.push(Update::error(err.to_string())),
            }
        }

        if let Some(state) = &self.state {
            let mut position = state.position;
            if state.playing {
                let elapsed = now.saturating_duration_since(self.anchor).as_millis();
                position = position.saturating_add(u64::try_from(elapsed).unwrap_or(u64::MAX));
            }
            let index = self
                .lines
                .as_deref()
                .map_or(0, |lines| current_index(lines, position));

            updates.push(Update {
                err: None,
                artists: state.artists.clone(),
                now_playing: state.now_playing.clone(),
                pic_url: state.pic_url.clone(),
                lines: self.lines.clone(),
                index,
            });
        }

        updates
    }

    fn refresh_lyrics(&mut self, state: &PlayerState) {
        if self.track_id.as_deref() == Some(state.id.as_str()) {
            return;
        }
        self.track_id = Some(state.id.clone());
        self.lines = None;

        let Some(provider) = self.provider else {
            return;
        };
        match provider.lyrics(&state.id, &state.query) {
            Ok(lines) => {
                debug!(
                    "{} returned {} lines for '{}'",
                    provider.name(),
                    lines.len(),
                    state.query
                );
                self.lines = Some(Arc::new(lines));
            }
            Err(LyricsError::NotFound) => {
                debug!("{} has no lyrics for '{}'", provider.name(), state.query);
            }
            Err(err) => warn!("{} failed for '{}': {}", provider.name(), state.query, err),
        }
    }
}

/// Runs the producer until `shutdown` is raised or `send` reports the queue
/// closed.
pub fn listen<F>(
    player: &dyn Player,
    provider: Option<&dyn LyricsProvider>,
    options: PoolOptions,
    shutdown: &AtomicBool,
    mut send: F,
) where
    F: FnMut(Update) -> bool,
{
    let mut listener = Listener::new(player, provider, options);
    info!(
        "Polling player every {:?}, ticking every {:?}",
        options.update_interval, options.timer_interval
    );

    'ticks: while !shutdown.load(Ordering::SeqCst) {
        for update in listener.tick(Instant::now()) {
            if !send(update) {
                break 'ticks;
            }
        }
        thread::sleep(options.timer_interval);
    }

    info!("Player polling stopped");
}

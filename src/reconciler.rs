//! The consumer side of the update queue.
//!
//! [`Reconciler`] owns the [`DisplayState`], compares every incoming
//! [`Update`] against it field by field and emits only the render commands
//! whose content actually changed.

use std::{fmt, sync::Arc};

use futures::{
    channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
    select_biased, StreamExt,
};
use log::{debug, error, info};

use crate::{
    artwork::{
        Artwork, ArtworkCache, ArtworkError, ArtworkFetcher, ArtworkLoader, ArtworkLookup,
        ArtworkMessage,
    },
    change::{artists_changed, rows_changed, text_changed},
    chunk::{chunk_text, grid_rows, DEFAULT_GRID_ROWS, DEFAULT_ROW_BUDGET},
    lyrics::timesynced,
    pool::Update,
    render::{RenderCommand, Renderer},
    wrap::{wrap_line, WrapPolicy},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    /// One wrapped line.
    Pipe,
    /// Fixed rows of chunked text.
    #[default]
    Grid,
}

impl DisplayMode {
    /// Unknown names fall back to `Grid`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "pipe" => DisplayMode::Pipe,
            _ => DisplayMode::Grid,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayMode::Pipe => f.write_str("pipe"),
            DisplayMode::Grid => f.write_str("grid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutOptions {
    pub mode: DisplayMode,
    pub policy: WrapPolicy,
    /// Pipe width; 0 disables wrapping.
    pub width: usize,
    pub row_budget: usize,
    pub rows: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            mode: DisplayMode::default(),
            policy: WrapPolicy::default(),
            width: 0,
            row_budget: DEFAULT_ROW_BUDGET,
            rows: DEFAULT_GRID_ROWS,
        }
    }
}

/// Routes non-fatal failures to the log, or hides them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorPolicy {
    pub ignore_errors: bool,
}

impl ErrorPolicy {
    pub fn report(&self, source: &str, err: &dyn fmt::Display) {
        if self.ignore_errors {
            debug!("{}: {}", source, err);
        } else {
            error!("{}: {}", source, err);
        }
    }
}

/// What was last sent to the renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayState {
    pub artists: Vec<String>,
    pub title: String,
    pub artwork: Option<Arc<Artwork>>,
    pub lyric: String,
    /// Every chunk of the current line, including those past the last row.
    pub chunks: Vec<String>,
    pub rows: Vec<String>,
}

impl DisplayState {
    pub fn new(rows: usize) -> Self {
        Self {
            rows: vec![String::new(); rows],
            ..Default::default()
        }
    }
}

/// Everything the reconciler reacts to.
#[derive(Debug)]
pub enum Event {
    Update(Update),
    Artwork(ArtworkMessage),
}

/// How new artwork URLs are resolved.
#[derive(Clone)]
pub enum FetchMode {
    /// Fetch on a worker thread and apply the result as a later event.
    Background(ArtworkLoader),
    /// Fetch inline, stalling the loop until the picture is decoded.
    Blocking(Arc<dyn ArtworkFetcher>),
}

pub struct Reconciler<R: Renderer> {
    options: LayoutOptions,
    errors: ErrorPolicy,
    state: DisplayState,
    cache: ArtworkCache,
    fetch: FetchMode,
    artwork_tx: UnboundedSender<ArtworkMessage>,
    artwork_rx: UnboundedReceiver<ArtworkMessage>,
    renderer: R,
}

impl<R: Renderer> Reconciler<R> {
    pub fn new(
        options: LayoutOptions,
        errors: ErrorPolicy,
        cache: ArtworkCache,
        fetch: FetchMode,
        renderer: R,
    ) -> Self {
        let options = LayoutOptions {
            row_budget: options.row_budget.max(1),
            rows: options.rows.max(1),
            ..options
        };
        let (artwork_tx, artwork_rx) = mpsc::unbounded();
        Self {
            options,
            errors,
            state: DisplayState::new(options.rows),
            cache,
            fetch,
            artwork_tx,
            artwork_rx,
            renderer,
        }
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    pub fn cache(&self) -> &ArtworkCache {
        &self.cache
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }

    /// Consumes updates until the producer closes the queue. Background
    /// artwork results are interleaved with updates as they arrive.
    pub async fn run(mut self, mut updates: UnboundedReceiver<Update>) -> Self {
        info!("Reconciler started in {} mode", self.options.mode);

        loop {
            let event = select_biased! {
                message = self.artwork_rx.select_next_some() => Event::Artwork(message),
                update = updates.next() => match update {
                    Some(update) => Event::Update(update),
                    None => break,
                },
            };
            self.handle(event);
        }

        info!("Update queue closed, reconciler stopping");
        self
    }

    /// Waits for the next background artwork result and applies it.
    /// Returns `false` once no more results can arrive.
    pub async fn settle_artwork(&mut self) -> bool {
        match self.artwork_rx.next().await {
            Some(message) => {
                self.handle(Event::Artwork(message));
                true
            }
            None => false,
        }
    }

    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Update(update) => self.apply_update(update),
            Event::Artwork(message) => self.apply_artwork(message),
        }
    }

    fn apply_update(&mut self, update: Update) {
        if let Some(err) = &update.err {
            self.errors.report("player", err);
            return;
        }

        if artists_changed(&self.state.artists, &update.artists) {
            self.state.artists = update.artists.clone();
            self.renderer
                .render(RenderCommand::SetArtists(update.artists.clone()));
        }

        if text_changed(&self.state.title, &update.now_playing) {
            self.state.title = update.now_playing.clone();
            self.renderer
                .render(RenderCommand::SetTitle(update.now_playing.clone()));
            // A new title unties the displayed picture from the old track.
            self.state.artwork = None;
        }

        self.sync_artwork(&update.pic_url);
        self.sync_lyrics(&update);
    }

    /// Artwork is only emitted when the URL changes. After a title change the
    /// display stays without artwork until a new URL arrives.
    fn sync_artwork(&mut self, url: &str) {
        match self.fetch.clone() {
            FetchMode::Blocking(fetcher) => {
                if url == self.cache.url() {
                    return;
                }
                match self.cache.resolve(url, fetcher.as_ref()) {
                    Ok(artwork) => self.show_artwork(artwork),
                    Err(err) => self.errors.report("artwork", &err),
                }
            }
            FetchMode::Background(loader) => match self.cache.begin(url) {
                ArtworkLookup::Unchanged => {}
                ArtworkLookup::Cleared => self.show_artwork(None),
                ArtworkLookup::Fetch(request) => {
                    debug!("Requesting artwork #{} {}", request.request_id, request.url);
                    let request_id = request.request_id;
                    let request_url = request.url.clone();
                    let tx = self.artwork_tx.clone();
                    let spawned = loader.spawn(request, move |message| {
                        let _ = tx.unbounded_send(message);
                    });
                    if let Err(err) = spawned {
                        self.apply_artwork(ArtworkMessage {
                            request_id,
                            url: request_url,
                            result: Err(ArtworkError::Transport(err.to_string())),
                        });
                    }
                }
            },
        }
    }

    fn apply_artwork(&mut self, message: ArtworkMessage) {
        match self.cache.complete(message) {
            Some(Ok(artwork)) => self.show_artwork(Some(artwork)),
            Some(Err(err)) => self.errors.report("artwork", &err),
            None => {}
        }
    }

    fn show_artwork(&mut self, artwork: Option<Arc<Artwork>>) {
        self.state.artwork = artwork.clone();
        self.renderer.render(RenderCommand::SetArtwork(artwork));
    }

    fn sync_lyrics(&mut self, update: &Update) {
        let words = update
            .lines
            .as_deref()
            .filter(|lines| timesynced(lines))
            .and_then(|lines| lines.get(update.index))
            .map(|line| line.words.as_str());

        match self.options.mode {
            DisplayMode::Pipe => {
                let text = match words {
                    Some(words) => wrap_line(words, self.options.policy, self.options.width),
                    None => update.now_playing.clone(),
                };
                if text_changed(&self.state.lyric, &text) {
                    self.state.lyric = text.clone();
                    self.renderer.render(RenderCommand::SetLyricLine(text));
                }
            }
            DisplayMode::Grid => {
                let (text, chunks) = match words {
                    Some(words) => (words.to_string(), chunk_text(words, self.options.row_budget)),
                    None => (update.now_playing.clone(), vec![update.now_playing.clone()]),
                };
                let rows = grid_rows(&chunks, self.options.rows);
                self.state.lyric = text;
                self.state.chunks = chunks;
                if rows_changed(&self.state.rows, &rows) {
                    self.state.rows = rows.clone();
                    self.renderer.render(RenderCommand::SetLyricRows(rows));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        artwork::test_support::CountingFetcher,
        lyrics::LyricLine,
        render::RecordingRenderer,
    };
    use futures::executor::block_on;

    fn grid_options() -> LayoutOptions {
        LayoutOptions::default()
    }

    fn pipe_options(policy: WrapPolicy, width: usize) -> LayoutOptions {
        LayoutOptions {
            mode: DisplayMode::Pipe,
            policy,
            width,
            ..Default::default()
        }
    }

    fn blocking(
        options: LayoutOptions,
        fetcher: Arc<CountingFetcher>,
    ) -> Reconciler<RecordingRenderer> {
        Reconciler::new(
            options,
            ErrorPolicy::default(),
            ArtworkCache::new(32),
            FetchMode::Blocking(fetcher),
            RecordingRenderer::default(),
        )
    }

    fn background(
        options: LayoutOptions,
        fetcher: Arc<CountingFetcher>,
    ) -> Reconciler<RecordingRenderer> {
        Reconciler::new(
            options,
            ErrorPolicy::default(),
            ArtworkCache::new(32),
            FetchMode::Background(ArtworkLoader::new(fetcher, 32)),
            RecordingRenderer::default(),
        )
    }

    fn synced(lines: &[&str]) -> Option<Arc<Vec<LyricLine>>> {
        Some(Arc::new(
            lines
                .iter()
                .enumerate()
                .map(|(i, words)| LyricLine::new(i as u64 * 1000, *words))
                .collect(),
        ))
    }

    fn update(title: &str, url: &str, lines: Option<Arc<Vec<LyricLine>>>, index: usize) -> Update {
        Update {
            err: None,
            artists: vec!["Artist".to_string()],
            now_playing: title.to_string(),
            pic_url: url.to_string(),
            lines,
            index,
        }
    }

    #[test]
    fn identical_updates_render_once() {
        let fetcher = Arc::new(CountingFetcher::serving(&["http://img/a.png"]));
        let mut reconciler = blocking(grid_options(), fetcher);
        let next = update("Song A", "http://img/a.png", synced(&["one", "two"]), 1);

        reconciler.handle(Event::Update(next.clone()));
        let first = reconciler.renderer_mut().take();
        assert_eq!(first.len(), 4);

        reconciler.handle(Event::Update(next));
        assert!(reconciler.renderer().commands.is_empty());
    }

    #[test]
    fn fallback_to_title_without_synced_lines() {
        let fetcher = Arc::new(CountingFetcher::default());
        let mut reconciler = blocking(pipe_options(WrapPolicy::Word, 4), fetcher);

        reconciler.handle(Event::Update(update("Song A", "", None, 0)));
        assert_eq!(reconciler.state().lyric, "Song A");
        assert!(reconciler
            .renderer()
            .commands
            .contains(&RenderCommand::SetLyricLine("Song A".into())));

        let unsynced = Some(Arc::new(vec![
            LyricLine::new(0, "plain"),
            LyricLine::new(0, "words"),
        ]));
        reconciler.handle(Event::Update(update("Song B", "", unsynced, 1)));
        assert_eq!(reconciler.state().lyric, "Song B");
    }

    #[test]
    fn out_of_range_index_falls_back_to_title() {
        let fetcher = Arc::new(CountingFetcher::default());
        let mut reconciler = blocking(grid_options(), fetcher);

        reconciler.handle(Event::Update(update("Song A", "", synced(&["a", "b"]), 7)));
        assert_eq!(reconciler.state().rows, vec!["Song A", "", "", ""]);
        assert_eq!(reconciler.state().chunks.len(), 1);
    }

    #[test]
    fn grid_mode_chunks_the_current_line() {
        let fetcher = Arc::new(CountingFetcher::default());
        let mut reconciler = blocking(grid_options(), fetcher);

        reconciler.handle(Event::Update(update("Song", "", synced(&["x", "Hello there friend"]), 1)));
        assert_eq!(
            reconciler.renderer().commands.last(),
            Some(&RenderCommand::SetLyricRows(vec![
                "Hello there friend".into(),
                String::new(),
                String::new(),
                String::new(),
            ]))
        );
    }

    #[test]
    fn grid_mode_drops_chunks_past_the_last_row() {
        let fetcher = Arc::new(CountingFetcher::default());
        let options = LayoutOptions {
            row_budget: 5,
            ..grid_options()
        };
        let mut reconciler = blocking(options, fetcher);

        let line = "aaaa bbbb cccc dddd eeee ffff";
        reconciler.handle(Event::Update(update("Song", "", synced(&["x", line]), 1)));
        assert_eq!(reconciler.state().chunks.len(), 6);
        assert_eq!(reconciler.state().rows, vec!["aaaa", "bbbb", "cccc", "dddd"]);
    }

    #[test]
    fn pipe_mode_wraps_with_policy() {
        let fetcher = Arc::new(CountingFetcher::default());
        let mut reconciler = blocking(pipe_options(WrapPolicy::Ellipsis, 10), fetcher);

        reconciler.handle(Event::Update(update("Song", "", synced(&["x", "a short one"]), 1)));
        assert_eq!(reconciler.state().lyric, "a short...");
        assert!(!reconciler
            .renderer()
            .commands
            .iter()
            .any(|c| matches!(c, RenderCommand::SetLyricRows(_))));
    }

    #[test]
    fn lyric_line_renders_only_when_text_changes() {
        let fetcher = Arc::new(CountingFetcher::default());
        let mut reconciler = blocking(pipe_options(WrapPolicy::Word, 5), fetcher);
        let lines = synced(&["hello world", "hello there", "goodbye"]);

        reconciler.handle(Event::Update(update("Song", "", lines.clone(), 0)));
        reconciler.renderer_mut().take();

        // Both lines wrap to "hello".
        reconciler.handle(Event::Update(update("Song", "", lines.clone(), 1)));
        assert!(reconciler.renderer().commands.is_empty());

        reconciler.handle(Event::Update(update("Song", "", lines, 2)));
        assert_eq!(
            reconciler.renderer_mut().take(),
            vec![RenderCommand::SetLyricLine("goodb".into())]
        );
    }

    #[test]
    fn error_updates_leave_display_untouched() {
        let fetcher = Arc::new(CountingFetcher::default());
        let mut reconciler = blocking(grid_options(), fetcher);
        reconciler.handle(Event::Update(update("Song A", "", None, 0)));
        let before = reconciler.state().clone();
        reconciler.renderer_mut().take();

        reconciler.handle(Event::Update(Update::error("lost connection")));
        assert_eq!(reconciler.state(), &before);
        assert!(reconciler.renderer().commands.is_empty());
    }

    #[test]
    fn artist_order_change_is_rendered() {
        let fetcher = Arc::new(CountingFetcher::default());
        let mut reconciler = blocking(grid_options(), fetcher);
        let mut first = update("Song", "", None, 0);
        first.artists = vec!["A".into(), "B".into()];
        let mut swapped = first.clone();
        swapped.artists = vec!["B".into(), "A".into()];

        reconciler.handle(Event::Update(first));
        reconciler.renderer_mut().take();
        reconciler.handle(Event::Update(swapped));
        assert_eq!(
            reconciler.renderer_mut().take(),
            vec![RenderCommand::SetArtists(vec!["B".into(), "A".into()])]
        );
    }

    #[test]
    fn blocking_mode_fetches_each_url_once() {
        let fetcher = Arc::new(CountingFetcher::serving(&["http://img/a.png", "http://img/b.png"]));
        let mut reconciler = blocking(grid_options(), fetcher.clone());

        reconciler.handle(Event::Update(update("Song A", "http://img/a.png", None, 0)));
        reconciler.handle(Event::Update(update("Song A", "http://img/a.png", None, 0)));
        assert_eq!(fetcher.calls(), 1);
        let first = reconciler.state().artwork.clone().unwrap();

        reconciler.handle(Event::Update(update("Song A", "http://img/b.png", None, 0)));
        assert_eq!(fetcher.calls(), 2);
        let second = reconciler.state().artwork.clone().unwrap();
        assert_eq!(second.url, "http://img/b.png");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn failed_fetch_keeps_previous_artwork() {
        let fetcher = Arc::new(CountingFetcher::serving(&["http://img/a.png"]));
        let mut reconciler = blocking(grid_options(), fetcher.clone());

        reconciler.handle(Event::Update(update("Song A", "http://img/a.png", None, 0)));
        reconciler.renderer_mut().take();
        reconciler.handle(Event::Update(update("Song A", "http://img/missing.png", None, 0)));

        assert_eq!(reconciler.state().artwork.as_ref().unwrap().url, "http://img/a.png");
        assert!(reconciler.renderer().commands.is_empty());

        reconciler.handle(Event::Update(update("Song A", "http://img/missing.png", None, 0)));
        assert_eq!(fetcher.calls(), 2);
    }

    #[test]
    fn title_change_drops_artwork_until_url_changes() {
        let fetcher = Arc::new(CountingFetcher::serving(&[
            "http://img/album.png",
            "http://img/next.png",
        ]));
        let mut reconciler = blocking(grid_options(), fetcher.clone());

        reconciler.handle(Event::Update(update("Track 1", "http://img/album.png", None, 0)));
        reconciler.renderer_mut().take();
        reconciler.handle(Event::Update(update("Track 2", "http://img/album.png", None, 0)));
        reconciler.handle(Event::Update(update("Track 2", "http://img/album.png", None, 0)));

        assert_eq!(fetcher.calls(), 1);
        assert!(reconciler.state().artwork.is_none());
        let commands = reconciler.renderer_mut().take();
        assert!(commands.contains(&RenderCommand::SetTitle("Track 2".into())));
        assert!(!commands
            .iter()
            .any(|c| matches!(c, RenderCommand::SetArtwork(_))));

        reconciler.handle(Event::Update(update("Track 2", "http://img/next.png", None, 0)));
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(reconciler.state().artwork.as_ref().unwrap().url, "http://img/next.png");
    }

    #[test]
    fn background_title_change_keeps_artwork_unresolved() {
        let fetcher = Arc::new(CountingFetcher::serving(&["http://img/album.png"]));
        let mut reconciler = background(grid_options(), fetcher.clone());

        reconciler.handle(Event::Update(update("Track 1", "http://img/album.png", None, 0)));
        assert!(block_on(reconciler.settle_artwork()));
        reconciler.renderer_mut().take();

        reconciler.handle(Event::Update(update("Track 2", "http://img/album.png", None, 0)));
        assert_eq!(fetcher.calls(), 1);
        assert!(reconciler.state().artwork.is_none());
        assert!(!reconciler
            .renderer()
            .commands
            .iter()
            .any(|c| matches!(c, RenderCommand::SetArtwork(_))));
    }

    #[test]
    fn empty_url_clears_artwork() {
        let fetcher = Arc::new(CountingFetcher::serving(&["http://img/a.png"]));
        let mut reconciler = blocking(grid_options(), fetcher);

        reconciler.handle(Event::Update(update("Song A", "http://img/a.png", None, 0)));
        reconciler.renderer_mut().take();
        reconciler.handle(Event::Update(update("Song A", "", None, 0)));
        assert_eq!(
            reconciler.renderer_mut().take(),
            vec![RenderCommand::SetArtwork(None)]
        );
    }

    #[test]
    fn background_fetch_applies_as_later_event() {
        let fetcher = Arc::new(CountingFetcher::serving(&["http://img/a.png"]));
        let mut reconciler = background(grid_options(), fetcher.clone());

        reconciler.handle(Event::Update(update("Song A", "http://img/a.png", None, 0)));
        assert!(reconciler.state().artwork.is_none());
        assert_eq!(reconciler.state().rows[0], "Song A");

        reconciler.handle(Event::Update(update("Song A", "http://img/a.png", None, 0)));
        assert!(block_on(reconciler.settle_artwork()));

        assert_eq!(fetcher.calls(), 1);
        let artwork = reconciler.state().artwork.clone().unwrap();
        assert_eq!((artwork.width(), artwork.height()), (32, 32));
        assert!(matches!(
            reconciler.renderer().commands.last(),
            Some(RenderCommand::SetArtwork(Some(_)))
        ));
    }

    #[test]
    fn background_fetch_ignores_superseded_results() {
        let fetcher = Arc::new(CountingFetcher::serving(&["http://img/a.png", "http://img/b.png"]));
        let mut reconciler = background(grid_options(), fetcher);

        reconciler.handle(Event::Update(update("Song A", "http://img/a.png", None, 0)));
        reconciler.handle(Event::Update(update("Song B", "http://img/b.png", None, 0)));

        // Two results may arrive; only the one for b.png is applied.
        let mut applied = None;
        for _ in 0..2 {
            if reconciler.cache().inflight().is_none() {
                break;
            }
            assert!(block_on(reconciler.settle_artwork()));
            applied = reconciler.state().artwork.clone();
        }
        assert_eq!(applied.unwrap().url, "http://img/b.png");
    }
}

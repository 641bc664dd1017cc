use std::{
    env, io,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use anyhow::{anyhow, Context};
use clap::Parser;
use futures::{channel::mpsc, executor::block_on};
use log::info;
use now_playing_lyrics::{
    artwork::{ArtworkCache, ArtworkFetcher, ArtworkLoader, UreqFetcher},
    config::{Config, Overrides, PlayerSource, COOKIE_ENV},
    logging::init_logging,
    lyrics::{LrcDirectoryProvider, LyricsProvider},
    player::{FilePlayer, HttpPlayer, Player},
    pool::listen,
    reconciler::{DisplayMode, ErrorPolicy, FetchMode, Reconciler},
    render::{GridRenderer, PipeRenderer, Renderer},
};

/// Shows the current track's lyrics, title, artists and cover in a terminal.
#[derive(Debug, Parser)]
#[command(name = "now-playing-lyrics", version, about)]
struct Cli {
    /// Config file to use instead of the default search path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Presentation mode: pipe or grid.
    #[arg(long, value_name = "MODE")]
    mode: Option<String>,

    /// Credential sent to the player endpoint.
    #[arg(long, value_name = "STRING")]
    cookie: Option<String>,

    /// Log at debug level and report every error.
    #[arg(short, long)]
    verbose: bool,

    /// Read player state from this JSON file.
    #[arg(long, value_name = "PATH")]
    player_file: Option<PathBuf>,

    /// Fetch player state from this URL.
    #[arg(long, value_name = "URL", conflicts_with = "player_file")]
    player_url: Option<String>,

    /// Directory of .lrc files.
    #[arg(long, value_name = "DIR")]
    lyrics_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_overrides(
        Overrides {
            mode: cli.mode,
            cookie: cli.cookie,
            verbose: cli.verbose,
            player_file: cli.player_file,
            player_url: cli.player_url,
            lyrics_dir: cli.lyrics_dir,
        },
        env::var(COOKIE_ENV).ok(),
    );
    info!(
        "Starting in {} mode, artwork {}",
        config.display.mode,
        if config.artwork.blocking { "inline" } else { "in background" }
    );

    let player: Box<dyn Player> = match config.player.source {
        PlayerSource::File => Box::new(FilePlayer::new(&config.player.path)),
        PlayerSource::Http => Box::new(HttpPlayer::new(
            config.player.url.clone(),
            config.cookie.clone(),
            config.player.timeout,
        )),
    };
    let provider: Option<Box<dyn LyricsProvider>> = config
        .lyrics
        .directory
        .as_ref()
        .map(|dir| Box::new(LrcDirectoryProvider::new(dir)) as Box<dyn LyricsProvider>);

    let (tx, rx) = mpsc::unbounded();
    let shutdown = Arc::new(AtomicBool::new(false));
    let producer = {
        let shutdown = shutdown.clone();
        let options = config.pool_options();
        thread::Builder::new()
            .name("player-poll".to_string())
            .spawn(move || {
                listen(
                    player.as_ref(),
                    provider.as_deref(),
                    options,
                    &shutdown,
                    |update| tx.unbounded_send(update).is_ok(),
                );
            })
            .context("Failed to start player polling thread")?
    };

    let renderer: Box<dyn Renderer> = match config.display.mode {
        DisplayMode::Pipe => Box::new(PipeRenderer::new(io::stdout())),
        DisplayMode::Grid => Box::new(GridRenderer::new(io::stdout(), true)),
    };
    let fetcher: Arc<dyn ArtworkFetcher> = Arc::new(UreqFetcher::new(config.artwork.timeout));
    let fetch = if config.artwork.blocking {
        FetchMode::Blocking(fetcher)
    } else {
        FetchMode::Background(ArtworkLoader::new(fetcher, config.artwork.size))
    };
    let reconciler = Reconciler::new(
        config.layout(),
        ErrorPolicy {
            ignore_errors: config.ignore_errors,
        },
        ArtworkCache::new(config.artwork.size),
        fetch,
        renderer,
    );

    block_on(reconciler.run(rx));

    shutdown.store(true, Ordering::SeqCst);
    producer
        .join()
        .map_err(|_| anyhow!("Player polling thread panicked"))?;

    Ok(())
}

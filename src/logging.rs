use env_logger::{Builder, Env, Target};

/// Sets up `env_logger` on stderr so stdout stays free for lyric output.
///
/// `RUST_LOG` wins over the default filter, which is `warn` (or `debug` when
/// `verbose`). Safe to call more than once.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };

    let _ = Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .target(Target::Stderr)
        .try_init();
}

//! Turns a stream of "now playing" updates into minimal render commands:
//! wrapped or chunked lyric text, title and artists, and cached artwork.

pub mod artwork;
pub mod change;
pub mod chunk;
pub mod config;
pub mod logging;
pub mod lyrics;
pub mod player;
pub mod pool;
pub mod reconciler;
pub mod render;
pub mod wrap;

use std::{io::Write, sync::Arc};

use log::{debug, warn};

use crate::artwork::Artwork;

/// Instruction for whatever draws the now-playing surface.
///
/// Every command is safe to repeat with unchanged content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCommand {
    SetArtists(Vec<String>),
    SetTitle(String),
    /// `None` means "no artwork".
    SetArtwork(Option<Arc<Artwork>>),
    /// Pipe mode.
    SetLyricLine(String),
    /// Grid mode, always one entry per grid row.
    SetLyricRows(Vec<String>),
}

pub trait Renderer {
    fn render(&mut self, command: RenderCommand);
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn render(&mut self, command: RenderCommand) {
        (**self).render(command)
    }
}

/// Collects commands instead of drawing them.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub commands: Vec<RenderCommand>,
}

impl RecordingRenderer {
    pub fn take(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.commands)
    }
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, command: RenderCommand) {
        self.commands.push(command);
    }
}

/// Prints lyric lines for pipe mode: one line per change.
pub struct PipeRenderer<W: Write> {
    out: W,
}

impl<W: Write> PipeRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for PipeRenderer<W> {
    fn render(&mut self, command: RenderCommand) {
        let RenderCommand::SetLyricLine(line) = command else {
            return;
        };
        let result = writeln!(self.out, "{line}").and_then(|_| self.out.flush());
        if let Err(err) = result {
            warn!("Failed to write lyric line: {}", err);
        }
    }
}

/// Redraws a small text block for grid mode: artists, title, then the rows.
pub struct GridRenderer<W: Write> {
    out: W,
    clear_screen: bool,
    artists: String,
    title: String,
    artwork: Option<(u32, u32)>,
    rows: Vec<String>,
}

impl<W: Write> GridRenderer<W> {
    pub fn new(out: W, clear_screen: bool) -> Self {
        Self {
            out,
            clear_screen,
            artists: String::new(),
            title: String::new(),
            artwork: None,
            rows: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn redraw(&mut self) -> std::io::Result<()> {
        if self.clear_screen {
            write!(self.out, "\x1b[2J\x1b[H")?;
        }
        match self.artwork {
            Some((w, h)) => writeln!(self.out, "[{w}x{h}] {}", self.artists)?,
            None => writeln!(self.out, "{}", self.artists)?,
        }
        writeln!(self.out, "{}", self.title)?;
        writeln!(self.out)?;
        for row in &self.rows {
            writeln!(self.out, "{row}")?;
        }
        self.out.flush()
    }
}

impl<W: Write> Renderer for GridRenderer<W> {
    fn render(&mut self, command: RenderCommand) {
        match command {
            RenderCommand::SetArtists(artists) => self.artists = artists.join(", "),
            RenderCommand::SetTitle(title) => self.title = title,
            RenderCommand::SetArtwork(artwork) => {
                self.artwork = artwork.map(|a| (a.width(), a.height()));
            }
            RenderCommand::SetLyricRows(rows) => self.rows = rows,
            RenderCommand::SetLyricLine(line) => {
                debug!("Grid renderer ignoring pipe line '{}'", line);
                return;
            }
        }
        if let Err(err) = self.redraw() {
            warn!("Failed to redraw grid: {}", err);
        }
    }
}

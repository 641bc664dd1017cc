//! Single-line wrapping for pipe mode.
//!
//! Every policy reduces an arbitrary lyric line to the *first* visible line of
//! its wrapped form. Widths are terminal cells and cuts never split a
//! grapheme cluster.

use std::fmt;

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

pub const ELLIPSIS: &str = "...";

/// How an over-long line is cut down to the configured width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapPolicy {
    /// Hard cut at exactly `width` characters, words may be split.
    None,
    /// Break on whitespace only.
    #[default]
    Word,
    /// Hard cut at `width - 3` characters followed by `...`.
    Ellipsis,
}

impl WrapPolicy {
    /// Parses a configuration name. Unknown names fail closed to `None`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "word" => WrapPolicy::Word,
            "ellipsis" => WrapPolicy::Ellipsis,
            _ => WrapPolicy::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WrapPolicy::None => "none",
            WrapPolicy::Word => "word",
            WrapPolicy::Ellipsis => "ellipsis",
        }
    }
}

impl fmt::Display for WrapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wraps `text` under `policy` and returns the first resulting line.
///
/// A `width` of zero disables wrapping and returns the text untouched.
pub fn wrap_line(text: &str, policy: WrapPolicy, width: usize) -> String {
    if width == 0 {
        return text.to_string();
    }

    match policy {
        WrapPolicy::None => hard_first_line(text, width),
        WrapPolicy::Word => word_first_line(text, width),
        WrapPolicy::Ellipsis => ellipsis_first_line(text, width),
    }
}

fn first_physical_line(text: &str) -> &str {
    text.split('\n').next().unwrap_or_default()
}

/// Display width of `text` in terminal cells.
pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

/// Longest grapheme prefix of `text` that fits in `width` cells.
fn take_columns(text: &str, width: usize) -> String {
    let mut line = String::new();
    let mut used = 0;

    for grapheme in text.graphemes(true) {
        let grapheme_width = display_width(grapheme);
        if used + grapheme_width > width {
            break;
        }
        line.push_str(grapheme);
        used += grapheme_width;
    }

    line
}

fn hard_first_line(text: &str, width: usize) -> String {
    take_columns(first_physical_line(text), width)
}

fn word_first_line(text: &str, width: usize) -> String {
    let mut line = String::new();
    let mut line_width = 0;

    for word in first_physical_line(text).split_whitespace() {
        let word_width = display_width(word);
        if line_width == 0 {
            if word_width > width {
                // A single word wider than the line still has to respect the bound.
                return take_columns(word, width);
            }
            line.push_str(word);
            line_width = word_width;
        } else if line_width + 1 + word_width <= width {
            line.push(' ');
            line.push_str(word);
            line_width += 1 + word_width;
        } else {
            break;
        }
    }

    line
}

fn ellipsis_first_line(text: &str, width: usize) -> String {
    let suffix_width = display_width(ELLIPSIS);
    if width <= suffix_width {
        return hard_first_line(text, width);
    }

    let fits = !text.contains('\n') && display_width(text) <= width;
    if fits {
        return text.to_string();
    }

    let mut line = hard_first_line(text, width - suffix_width);
    line.push_str(ELLIPSIS);
    line
}

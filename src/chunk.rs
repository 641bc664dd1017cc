//! Greedy word packing for the grid display.

use crate::wrap::display_width;

pub const DEFAULT_ROW_BUDGET: usize = 40;
pub const DEFAULT_GRID_ROWS: usize = 4;

/// Splits `text` into whitespace-separated words and packs them greedily into
/// chunks of at most `budget` terminal cells.
///
/// Words are never split. A word longer than the budget gets a chunk of its own.
pub fn chunk_text(text: &str, budget: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = display_width(word);
        if current_len == 0 {
            current.push_str(word);
            current_len = word_len;
        } else if current_len + word_len + 1 <= budget {
            current.push(' ');
            current.push_str(word);
            current_len += word_len + 1;
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Maps chunks onto exactly `rows` display rows. Missing rows are blank and
/// chunks past the last row are dropped.
pub fn grid_rows(chunks: &[String], rows: usize) -> Vec<String> {
    (0..rows)
        .map(|index| chunks.get(index).cloned().unwrap_or_default())
        .collect()
}

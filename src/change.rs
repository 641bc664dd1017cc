//! Per-field change checks between the last rendered state and a new update.
//!
//! Each field is compared on its own so that the reconciler can decide per
//! render command whether anything needs to be redrawn.

/// Artist lists are equal only when they hold the same names in the same order.
pub fn artists_changed(previous: &[String], next: &[String]) -> bool {
    previous != next
}

pub fn text_changed(previous: &str, next: &str) -> bool {
    previous != next
}

pub fn rows_changed(previous: &[String], next: &[String]) -> bool {
    previous != next
}

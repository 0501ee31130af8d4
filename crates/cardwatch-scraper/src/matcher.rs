//! Title match policy.
//!
//! A candidate title matches a resolved product when every search phrase
//! appears as a substring and no exclusion does, all compared case-,
//! accent-, and whitespace-insensitively. Set-sibling exclusions are already
//! materialised on the resolved product by config resolution.

use crate::normalize::fold_text;

/// Applies the match policy to one candidate title.
#[must_use]
pub fn title_matches(title: &str, phrases: &[String], exclude: &[String]) -> bool {
    let folded = fold_text(title);
    let every_phrase = phrases
        .iter()
        .all(|phrase| folded.contains(&fold_text(phrase)));
    let no_exclusion = !exclude
        .iter()
        .any(|excluded| folded.contains(&fold_text(excluded)));
    every_phrase && no_exclusion
}

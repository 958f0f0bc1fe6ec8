//! Search query construction.

use super::candidate::WantedTrack;

/// Cuts " feat. X" / " ft. X" / " featuring X" (and the bracketed forms) from a title.
fn strip_featured(s: &str) -> &str {
    let lower = s.to_lowercase();
    let markers = [" feat. ", " feat ", " ft. ", " ft ", " featuring ", "(feat", "(ft", "[feat"];
    let cut = markers
        .iter()
        .filter_map(|m| lower.find(m))
        .min()
        .unwrap_or(s.len());
    // Markers are ASCII, so the byte offset is valid in `s` as long as lowercasing
    // kept its length; fall back to the whole string otherwise.
    if lower.len() == s.len() && s.is_char_boundary(cut) {
        s[..cut].trim_end()
    } else {
        s
    }
}

/// `"{artist} {title}"` normalised for peer search: featured artists dropped,
/// punctuation replaced with spaces, whitespace collapsed.
pub fn build_search_query(wanted: &WantedTrack) -> String {
    let artist = strip_featured(&wanted.artist);
    let title = strip_featured(&wanted.title);
    format!("{} {}", artist, title)
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '\'' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

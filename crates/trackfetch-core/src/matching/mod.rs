//! Candidate search and scoring.
//!
//! Raw search responses are filtered by hard rules (format, bitrate,
//! exclusion keywords), then survivors are scored by fuzzy name similarity,
//! format quality, and bitrate. Everything here is pure and deterministic.

mod candidate;
mod filter;
mod query;
mod score;
mod similarity;

pub use candidate::{file_extension, file_stem, Candidate, WantedTrack};
pub use filter::{check, MatchConstraints, Rejection};
pub use query::build_search_query;
pub use score::{bitrate_bonus, format_score, rank, score, select_best, ScoredCandidate};
pub use similarity::{ratio, token_set_ratio};

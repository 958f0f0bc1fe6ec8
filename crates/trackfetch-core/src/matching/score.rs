//! Weighted scoring and best-candidate selection.

use super::candidate::{file_extension, file_stem, Candidate, WantedTrack};
use super::filter::{check, MatchConstraints};
use super::similarity::token_set_ratio;

const SIMILARITY_WEIGHT: f64 = 0.5;
const FORMAT_WEIGHT: f64 = 0.4;

/// Fixed quality table by extension: lossless 100, high-quality lossy 70,
/// medium lossy 60, low 30, anything else 10.
pub fn format_score(extension: Option<&str>) -> f64 {
    match extension {
        Some("flac" | "alac" | "wav" | "aiff" | "aif" | "ape" | "wv") => 100.0,
        Some("mp3") => 70.0,
        Some("m4a" | "aac" | "ogg" | "opus") => 60.0,
        Some("wma") => 30.0,
        _ => 10.0,
    }
}

/// +10 at 320 kbps or more, +5 at 256 or more, otherwise (or unknown) 0.
pub fn bitrate_bonus(bitrate: Option<u32>) -> f64 {
    match bitrate {
        Some(b) if b >= 320 => 10.0,
        Some(b) if b >= 256 => 5.0,
        _ => 0.0,
    }
}

/// Total score in 0..=100 for a candidate that already passed filtering.
pub fn score(candidate: &Candidate, wanted: &WantedTrack) -> f64 {
    let similarity = token_set_ratio(&wanted.match_text(), file_stem(&candidate.filename));
    let ext = file_extension(&candidate.filename);
    SIMILARITY_WEIGHT * similarity
        + FORMAT_WEIGHT * format_score(ext.as_deref())
        + bitrate_bonus(candidate.bitrate)
}

/// A filtered survivor with its score and its position in the input list.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub index: usize,
    pub score: f64,
    pub candidate: Candidate,
}

/// Every survivor, best first; equal scores keep input order.
pub fn rank(
    candidates: &[Candidate],
    wanted: &WantedTrack,
    constraints: &MatchConstraints,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| check(c, constraints).is_ok())
        .map(|(index, c)| ScoredCandidate {
            index,
            score: score(c, wanted),
            candidate: c.clone(),
        })
        .collect();
    // Stable sort: ties keep the earlier candidate first.
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

/// Best acceptable candidate, or `None` when filtering leaves nothing.
pub fn select_best(
    candidates: &[Candidate],
    wanted: &WantedTrack,
    constraints: &MatchConstraints,
) -> Option<Candidate> {
    let mut best: Option<(f64, &Candidate)> = None;
    for c in candidates {
        if check(c, constraints).is_err() {
            continue;
        }
        let s = score(c, wanted);
        match best {
            Some((best_score, _)) if s <= best_score => {}
            _ => best = Some((s, c)),
        }
    }
    best.map(|(_, c)| c.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wanted() -> WantedTrack {
        WantedTrack::new("Artist", "Title")
    }

    #[test]
    fn filter_leaves_only_the_flac() {
        let candidates = vec![
            Candidate::new("alice", "Artist - Title.flac"),
            Candidate::new("bob", "Artist Title (Live).mp3").with_bitrate(320),
            Candidate::new("carol", "artist_title.mp3").with_bitrate(192),
        ];
        let best = select_best(&candidates, &wanted(), &MatchConstraints::default()).unwrap();
        assert_eq!(best.peer, "alice");
        assert_eq!(best.filename, "Artist - Title.flac");
        assert_eq!(rank(&candidates, &wanted(), &MatchConstraints::default()).len(), 1);
    }

    #[test]
    fn excluded_candidate_never_wins_even_with_best_score() {
        let candidates = vec![
            Candidate::new("a", "Artist - Title (Acoustic).flac").with_bitrate(1411),
            Candidate::new("b", "Some Other Song.ogg"),
        ];
        let best = select_best(&candidates, &wanted(), &MatchConstraints::default()).unwrap();
        assert_eq!(best.peer, "b");
    }

    #[test]
    fn empty_after_filtering_is_none() {
        let candidates = vec![
            Candidate::new("a", "Artist - Title (Karaoke Version).mp3"),
            Candidate::new("b", "Artist - Title.wma"),
        ];
        assert!(select_best(&candidates, &wanted(), &MatchConstraints::default()).is_none());
        assert!(select_best(&[], &wanted(), &MatchConstraints::default()).is_none());
    }

    #[test]
    fn lossless_beats_lossy_for_same_name() {
        let candidates = vec![
            Candidate::new("a", "Artist - Title.mp3").with_bitrate(320),
            Candidate::new("b", "Artist - Title.flac"),
        ];
        // mp3: 50 + 28 + 10 = 88; flac: 50 + 40 + 0 = 90
        let best = select_best(&candidates, &wanted(), &MatchConstraints::default()).unwrap();
        assert_eq!(best.peer, "b");
    }

    #[test]
    fn exact_tie_keeps_earliest() {
        let candidates = vec![
            Candidate::new("first", "Artist - Title.flac"),
            Candidate::new("second", "Title - Artist.flac"),
        ];
        let best = select_best(&candidates, &wanted(), &MatchConstraints::default()).unwrap();
        assert_eq!(best.peer, "first");
        let ranked = rank(&candidates, &wanted(), &MatchConstraints::default());
        assert_eq!(ranked[0].index, 0);
        assert_eq!(ranked[1].index, 1);
    }

    #[test]
    fn selection_is_deterministic() {
        let candidates: Vec<Candidate> = (0..20)
            .map(|i| {
                Candidate::new(format!("peer{i}"), format!("Artist - Title {}.mp3", i % 3))
                    .with_bitrate(256 + (i % 2) * 64)
            })
            .collect();
        let c = MatchConstraints::default();
        let first = select_best(&candidates, &wanted(), &c);
        for _ in 0..5 {
            assert_eq!(select_best(&candidates, &wanted(), &c), first);
        }
    }

    #[test]
    fn score_components() {
        assert_eq!(format_score(Some("flac")), 100.0);
        assert_eq!(format_score(Some("mp3")), 70.0);
        assert_eq!(format_score(Some("ogg")), 60.0);
        assert_eq!(format_score(Some("wma")), 30.0);
        assert_eq!(format_score(None), 10.0);
        assert_eq!(bitrate_bonus(Some(320)), 10.0);
        assert_eq!(bitrate_bonus(Some(256)), 5.0);
        assert_eq!(bitrate_bonus(Some(255)), 0.0);
        assert_eq!(bitrate_bonus(None), 0.0);
        let s = score(&Candidate::new("p", "Artist - Title.flac"), &wanted());
        assert!((s - 90.0).abs() < 1e-9);
    }
}

//! Hard filters: a rejected candidate is never scored.

use crate::config::MatchConfig;

use super::candidate::{file_extension, Candidate};

/// Filtering constraints, read from config at job start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchConstraints {
    pub min_bitrate: u32,
    /// Lowercased extensions, best first.
    pub preferred_formats: Vec<String>,
    /// Lowercased keywords.
    pub exclusion_keywords: Vec<String>,
}

impl Default for MatchConstraints {
    fn default() -> Self {
        Self::from_config(&MatchConfig::default())
    }
}

impl MatchConstraints {
    pub fn from_config(cfg: &MatchConfig) -> Self {
        Self {
            min_bitrate: cfg.min_bitrate,
            preferred_formats: normalize(&cfg.preferred_formats, true),
            exclusion_keywords: normalize(&cfg.exclusion_keywords, false),
        }
    }
}

fn normalize(values: &[String], strip_dot: bool) -> Vec<String> {
    values
        .iter()
        .map(|v| {
            let v = v.trim().to_lowercase();
            if strip_dot {
                v.trim_start_matches('.').to_string()
            } else {
                v
            }
        })
        .filter(|v| !v.is_empty())
        .collect()
}

/// Why a candidate was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// File name contains an exclusion keyword (wrong recording).
    ExcludedKeyword(String),
    /// Extension missing or not in `preferred_formats`.
    UnsupportedFormat(Option<String>),
    /// Known bitrate below `min_bitrate`.
    BitrateTooLow(u32),
}

/// Returns `Err` with the first rule the candidate breaks; unknown bitrate passes.
pub fn check(candidate: &Candidate, constraints: &MatchConstraints) -> Result<(), Rejection> {
    let name = candidate.base_name().to_lowercase();
    if let Some(keyword) = constraints
        .exclusion_keywords
        .iter()
        .find(|k| name.contains(k.as_str()))
    {
        return Err(Rejection::ExcludedKeyword(keyword.clone()));
    }

    let ext = file_extension(&candidate.filename);
    match ext.as_deref() {
        Some(e) if constraints.preferred_formats.iter().any(|f| f == e) => {}
        _ => return Err(Rejection::UnsupportedFormat(ext)),
    }

    if let Some(bitrate) = candidate.bitrate {
        if bitrate < constraints.min_bitrate {
            return Err(Rejection::BitrateTooLow(bitrate));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_match_is_case_insensitive_substring() {
        let c = MatchConstraints::default();
        let live = Candidate::new("p", "Artist - Title (LIVE at Wembley).flac");
        assert_eq!(check(&live, &c), Err(Rejection::ExcludedKeyword("live".into())));
        let remix = Candidate::new("p", "Artist - Title [Club Remix].mp3").with_bitrate(320);
        assert_eq!(check(&remix, &c), Err(Rejection::ExcludedKeyword("remix".into())));
    }

    #[test]
    fn keywords_only_look_at_the_file_name() {
        let c = MatchConstraints::default();
        let cand = Candidate::new("p", "Live Recordings\\Artist - Title.flac");
        assert_eq!(check(&cand, &c), Ok(()));
    }

    #[test]
    fn unknown_bitrate_passes_low_bitrate_fails() {
        let c = MatchConstraints::default();
        assert!(check(&Candidate::new("p", "a - b.mp3"), &c).is_ok());
        assert_eq!(
            check(&Candidate::new("p", "a - b.mp3").with_bitrate(192), &c),
            Err(Rejection::BitrateTooLow(192))
        );
        assert!(check(&Candidate::new("p", "a - b.mp3").with_bitrate(256), &c).is_ok());
    }

    #[test]
    fn formats_outside_the_list_are_rejected() {
        let c = MatchConstraints::default();
        assert_eq!(
            check(&Candidate::new("p", "a - b.wma"), &c),
            Err(Rejection::UnsupportedFormat(Some("wma".into())))
        );
        assert_eq!(
            check(&Candidate::new("p", "cover.jpg"), &c),
            Err(Rejection::ExcludedKeyword("cover".into()))
        );
        assert_eq!(
            check(&Candidate::new("p", "folder"), &c),
            Err(Rejection::UnsupportedFormat(None))
        );
    }

    #[test]
    fn config_values_are_normalized() {
        let cfg = MatchConfig {
            min_bitrate: 128,
            preferred_formats: vec![".FLAC".into(), " mp3 ".into()],
            exclusion_keywords: vec!["Karaoke".into(), "".into()],
        };
        let c = MatchConstraints::from_config(&cfg);
        assert_eq!(c.preferred_formats, vec!["flac", "mp3"]);
        assert_eq!(c.exclusion_keywords, vec!["karaoke"]);
    }
}

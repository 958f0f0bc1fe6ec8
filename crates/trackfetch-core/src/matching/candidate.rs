//! Remote file offers and the wanted track they are matched against.

use serde::{Deserialize, Serialize};

/// One offer from the candidate source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Remote peer (username) offering the file.
    pub peer: String,
    /// Remote path as reported by the peer, e.g. `Music\Artist\Album\01 - Title.flac`.
    pub filename: String,
    /// Declared bitrate in kbps, if the peer reported one.
    pub bitrate: Option<u32>,
    /// Declared size in bytes.
    pub size: Option<u64>,
}

impl Candidate {
    pub fn new(peer: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            filename: filename.into(),
            bitrate: None,
            size: None,
        }
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    /// Last path component; peers use either `/` or `\` as separator.
    pub fn base_name(&self) -> &str {
        base_name(&self.filename)
    }
}

/// The track a download is trying to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WantedTrack {
    pub artist: String,
    pub title: String,
    #[serde(default)]
    pub album: Option<String>,
}

impl WantedTrack {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            album: None,
        }
    }

    /// `"{artist} {title}"`, the string candidates are compared against.
    pub fn match_text(&self) -> String {
        format!("{} {}", self.artist, self.title)
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(path)
}

/// Lowercased extension of the file's base name, without the dot.
pub fn file_extension(path: &str) -> Option<String> {
    let name = base_name(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Base name with the extension stripped.
pub fn file_stem(path: &str) -> &str {
    let name = base_name(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => stem,
        _ => name,
    }
}

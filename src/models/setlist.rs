//! Candidate setlists extracted from one video's text corpus

use chrono::{DateTime, Utc};

/// One parsed timestamp line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampLine {
    /// Offset into the stream, seconds
    pub offset_s: u32,
    pub song: String,
    pub artist: Option<String>,
    /// The source line before cleanup, kept for diagnostics
    pub raw: String,
}

/// Where a candidate setlist came from.
///
/// Comments carry the engagement and ordering signals the selector ranks
/// by; the description carries none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Description,
    Comment {
        /// Position in the fetched comment page order
        index: usize,
        like_count: u64,
        published_at: DateTime<Utc>,
    },
}

impl Origin {
    /// Stable tag for diagnostics and tie-breaking
    pub fn tag(&self) -> String {
        match self {
            Origin::Description => "description".to_string(),
            Origin::Comment { index, .. } => format!("comment{}", index),
        }
    }

    pub fn is_description(&self) -> bool {
        matches!(self, Origin::Description)
    }
}

/// An ordered sequence of timestamp lines from one source, with the
/// quality signals the selector and confidence scorer consume.
///
/// Offsets are non-decreasing up to the parser's out-of-order tolerance;
/// the monotonicity filter enforces that before construction.
#[derive(Debug, Clone)]
pub struct CandidateSetlist {
    pub origin: Origin,
    pub lines: Vec<TimestampLine>,
    /// Ranking score in [0, 1], per the parser's quality function
    pub quality: f64,
    /// Fraction of lines carrying a non-empty artist
    pub artist_ratio: f64,
}

impl CandidateSetlist {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

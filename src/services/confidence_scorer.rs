//! Singing-stream confidence scoring
//!
//! Produces the per-video scalar in [0, 1] that gates the singing-only
//! publishing bucket. Signals are independent and each contributes at
//! most once; the raw sum is normalized against the maximum achievable
//! positive total.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{CandidateSetlist, Comment, Video};

static TITLE_SINGING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)歌|歌枠|うた|singing|karaoke").expect("title regex"));
static DESC_SETLIST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)歌|セトリ|setlist").expect("description regex"));
static TITLE_EXCLUDE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ゲーム実況|gameplay|プレイ動画|雑談").expect("exclude regex"));
static ANCHOR_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,3}:\d{2}(?::\d{2})?").expect("anchor regex"));

/// Signal weights. Tunable here, not via run config; only the publishing
/// threshold is operator-facing.
#[derive(Debug, Clone)]
pub struct ScoreWeights {
    pub title_singing: f64,
    pub description_setlist: f64,
    pub setlist_size: f64,
    pub artist_ratio_high: f64,
    pub artist_ratio_mid: f64,
    pub artist_ratio_low: f64,
    pub long_duration: f64,
    pub comment_anchors: f64,
    pub title_exclude: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            title_singing: 3.0,
            description_setlist: 2.0,
            setlist_size: 3.0,
            artist_ratio_high: 5.0,
            artist_ratio_mid: 3.0,
            artist_ratio_low: 1.0,
            long_duration: 2.0,
            comment_anchors: 2.0,
            title_exclude: 5.0,
        }
    }
}

impl ScoreWeights {
    /// Sum of the maximum achievable positive contributions.
    fn max_raw(&self) -> f64 {
        self.title_singing
            + self.description_setlist
            + self.setlist_size
            + self.artist_ratio_high
            + self.long_duration
            + self.comment_anchors
    }
}

pub struct ConfidenceScorer {
    weights: ScoreWeights,
}

impl ConfidenceScorer {
    pub fn new() -> Self {
        ConfidenceScorer {
            weights: ScoreWeights::default(),
        }
    }

    pub fn with_weights(weights: ScoreWeights) -> Self {
        ConfidenceScorer { weights }
    }

    /// Score one video given its selected setlist (if any) and fetched
    /// comment corpus.
    pub fn score(
        &self,
        video: &Video,
        selected: Option<&CandidateSetlist>,
        comments: &[Comment],
    ) -> f64 {
        let w = &self.weights;
        let mut singing = 0.0;

        if TITLE_SINGING_RE.is_match(&video.title) {
            singing += w.title_singing;
        }
        if DESC_SETLIST_RE.is_match(&video.description) {
            singing += w.description_setlist;
        }
        if let Some(setlist) = selected {
            if setlist.len() >= 10 {
                singing += w.setlist_size;
            }
            if setlist.artist_ratio >= 0.8 {
                singing += w.artist_ratio_high;
            } else if setlist.artist_ratio >= 0.5 {
                singing += w.artist_ratio_mid;
            } else if setlist.artist_ratio >= 0.2 {
                singing += w.artist_ratio_low;
            }
        }
        if video.duration_s >= 1800 {
            singing += w.long_duration;
        }
        if comment_anchor_lines(comments) >= 3 {
            singing += w.comment_anchors;
        }

        let mut exclude = 0.0;
        if TITLE_EXCLUDE_RE.is_match(&video.title) {
            exclude += w.title_exclude;
        }

        ((singing - exclude) / w.max_raw()).clamp(0.0, 1.0)
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Count of comment-corpus lines carrying a timestamp anchor.
fn comment_anchor_lines(comments: &[Comment]) -> usize {
    comments
        .iter()
        .flat_map(|c| c.text.lines())
        .filter(|line| ANCHOR_LINE_RE.is_match(line))
        .count()
}

//! Best-setlist selection
//!
//! One video yields at most one authoritative setlist, chosen from the
//! description candidate and every comment candidate. Pure function; all
//! ranking inputs travel inside the candidates themselves.

use crate::models::{CandidateSetlist, Origin};

/// Minimum retained lines for a candidate to be considered at all.
const MIN_LINES: usize = 3;

/// Line/quality bar above which the description wins outright.
const DESCRIPTION_QUALITY_BAR: f64 = 0.6;
const DESCRIPTION_LINE_BAR: usize = 5;

/// Pick the single best candidate, or `None` when nothing reaches the
/// minimum line count.
///
/// A strong description (quality >= 0.6 and at least 5 lines) beats any
/// comment. Otherwise comment candidates race on
/// `quality + 0.1·log10(1 + like_count)`; ties break by more lines,
/// earlier publish time, then lexicographic origin tag. A description
/// that merely clears the minimum line bar is the fallback when no
/// comment qualifies.
pub fn select(candidates: Vec<CandidateSetlist>) -> Option<CandidateSetlist> {
    let mut description: Option<CandidateSetlist> = None;
    let mut comments: Vec<CandidateSetlist> = Vec::new();
    for candidate in candidates {
        if candidate.len() < MIN_LINES {
            continue;
        }
        match candidate.origin {
            Origin::Description => description = Some(candidate),
            Origin::Comment { .. } => comments.push(candidate),
        }
    }

    if let Some(desc) = &description {
        if desc.quality >= DESCRIPTION_QUALITY_BAR && desc.len() >= DESCRIPTION_LINE_BAR {
            return description;
        }
    }

    let best_comment = comments.into_iter().max_by(|a, b| {
        rank(a)
            .partial_cmp(&rank(b))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.len().cmp(&b.len()))
            .then_with(|| published_at(b).cmp(&published_at(a)))
            .then_with(|| b.origin.tag().cmp(&a.origin.tag()))
    });

    best_comment.or(description)
}

/// Comment ranking score: quality boosted by engagement.
fn rank(candidate: &CandidateSetlist) -> f64 {
    let like_count = match candidate.origin {
        Origin::Comment { like_count, .. } => like_count,
        Origin::Description => 0,
    };
    candidate.quality + 0.1 * (1.0 + like_count as f64).log10()
}

fn published_at(candidate: &CandidateSetlist) -> chrono::DateTime<chrono::Utc> {
    match candidate.origin {
        Origin::Comment { published_at, .. } => published_at,
        Origin::Description => chrono::DateTime::<chrono::Utc>::MIN_UTC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimestampLine;
    use chrono::{TimeZone, Utc};

    fn lines(n: usize, with_artist: bool) -> Vec<TimestampLine> {
        (0..n)
            .map(|i| TimestampLine {
                offset_s: (i as u32) * 180,
                song: format!("曲{}", i),
                artist: with_artist.then(|| format!("歌手{}", i)),
                raw: String::new(),
            })
            .collect()
    }

    fn candidate(origin: Origin, n: usize, with_artist: bool) -> CandidateSetlist {
        let lines = lines(n, with_artist);
        let (quality, artist_ratio) = crate::services::timestamp_parser::score_quality(&lines);
        CandidateSetlist {
            origin,
            lines,
            quality,
            artist_ratio,
        }
    }

    fn comment(index: usize, like_count: u64, n: usize, with_artist: bool) -> CandidateSetlist {
        candidate(
            Origin::Comment {
                index,
                like_count,
                published_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, index as u32, 0).unwrap(),
            },
            n,
            with_artist,
        )
    }

    #[test]
    fn test_strong_description_wins() {
        let desc = candidate(Origin::Description, 8, true); // quality 0.86
        let com = comment(0, 10_000, 12, true);
        let selected = select(vec![desc, com]).unwrap();
        assert!(selected.origin.is_description());
    }

    #[test]
    fn test_comment_beats_weak_description() {
        // 3 artist-less description lines vs a 12-line annotated comment
        let desc = candidate(Origin::Description, 3, false);
        let com = comment(0, 50, 12, true);
        let selected = select(vec![desc, com]).unwrap();
        assert_eq!(selected.origin.tag(), "comment0");
    }

    #[test]
    fn test_likes_break_quality_parity() {
        let a = comment(0, 0, 10, true);
        let b = comment(1, 500, 10, true);
        let selected = select(vec![a, b]).unwrap();
        assert_eq!(selected.origin.tag(), "comment1");
    }

    #[test]
    fn test_tie_broken_by_line_count() {
        // same likes; candidate with more lines has higher count_term and
        // also wins the explicit tie-break
        let a = comment(0, 7, 15, true);
        let b = comment(1, 7, 10, true);
        let selected = select(vec![b, a]).unwrap();
        assert_eq!(selected.origin.tag(), "comment0");
    }

    #[test]
    fn test_exact_tie_prefers_earlier_comment() {
        let a = comment(0, 7, 10, true); // published one minute earlier
        let b = comment(1, 7, 10, true);
        let selected = select(vec![b, a]).unwrap();
        assert_eq!(selected.origin.tag(), "comment0");
    }

    #[test]
    fn test_too_small_candidates_yield_none() {
        let desc = candidate(Origin::Description, 2, true);
        let com = comment(0, 9999, 2, true);
        assert!(select(vec![desc, com]).is_none());
    }

    #[test]
    fn test_description_fallback_when_no_comment_qualifies() {
        let desc = candidate(Origin::Description, 4, false); // below outright-win bar
        let selected = select(vec![desc]).unwrap();
        assert!(selected.origin.is_description());
    }
}

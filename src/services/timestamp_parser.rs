//! Timestamp extraction from free text
//!
//! Turns one description or comment into a `CandidateSetlist`: anchor
//! detection, payload cleanup, song/artist split, monotonicity filter,
//! and the quality score the selector ranks candidates by.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{CandidateSetlist, Origin, TimestampLine};
use crate::util::text::{is_valid_song_entry, strip_html, strip_leading_numbering};
use crate::util::time::parse_hms;

/// Syntactic time anchor; field ranges are validated separately.
static ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,3}:\d{2}(?::\d{2})?").expect("anchor regex"));

/// Separators that may sit between the anchor and the payload.
const PAYLOAD_SEPARATORS: &[char] = &[' ', '-', '–', '—', ':', '：', '・', '･', '）', ')'];

/// Backwards jumps larger than this many seconds are dropped as
/// out-of-order annotations; smaller jitter is tolerated.
const MONOTONICITY_TOLERANCE_S: u32 = 5;

/// Parse one text corpus (a description or a single comment) into a
/// candidate setlist.
pub fn parse_candidate(text: &str, origin: Origin) -> CandidateSetlist {
    let cleaned = strip_html(text);
    let mut entries: Vec<TimestampLine> = Vec::new();
    // A bare anchor adopts the next non-empty line as its payload
    let mut pending: Option<(u32, String)> = None;

    for line in cleaned.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match find_anchor(line) {
            Some((anchor_end, offset_s)) => {
                let payload = extract_payload(&line[anchor_end..]);
                if payload.is_empty() {
                    pending = Some((offset_s, line.to_string()));
                } else {
                    pending = None;
                    push_entry(&mut entries, offset_s, &payload, line);
                }
            }
            None => {
                if let Some((offset_s, _)) = pending.take() {
                    push_entry(&mut entries, offset_s, line, line);
                }
            }
        }
    }

    let lines = monotonicity_filter(entries);
    let (quality, artist_ratio) = score_quality(&lines);
    CandidateSetlist {
        origin,
        lines,
        quality,
        artist_ratio,
    }
}

/// Locate the first time anchor on a line.
///
/// Returns the byte offset just past the anchor and the parsed offset in
/// seconds. Matches glued to surrounding digits (`12:345`, `v1:23`) are
/// not anchors. A three-part match with an out-of-range hour field is
/// retried as its `M:SS` prefix, matching how annotators actually write.
fn find_anchor(line: &str) -> Option<(usize, u32)> {
    for m in ANCHOR_RE.find_iter(line) {
        if let Some(prev) = line[..m.start()].chars().next_back() {
            if prev.is_ascii_digit() || prev == ':' {
                continue;
            }
        }
        if let Some(next) = line[m.end()..].chars().next() {
            if next.is_ascii_digit() {
                continue;
            }
        }
        let text = m.as_str();
        if let Some(offset) = parse_hms(text) {
            return Some((m.end(), offset));
        }
        // H:MM:SS with invalid hours may still open with a valid M:SS
        if let Some(prefix_len) = text.char_indices().filter(|(_, c)| *c == ':').nth(1).map(|(i, _)| i) {
            let prefix = &text[..prefix_len];
            if let Some(offset) = parse_hms(prefix) {
                return Some((m.start() + prefix_len, offset));
            }
        }
        // first syntactic match decides; an invalid one skips the line
        return None;
    }
    None
}

/// Everything after the anchor, trimmed, with one optional leading
/// separator consumed.
fn extract_payload(rest: &str) -> String {
    let rest = rest.trim_start();
    let rest = match rest.chars().next() {
        Some(c) if PAYLOAD_SEPARATORS.contains(&c) => &rest[c.len_utf8()..],
        _ => rest,
    };
    rest.trim().to_string()
}

fn push_entry(entries: &mut Vec<TimestampLine>, offset_s: u32, payload: &str, raw: &str) {
    let payload = strip_leading_numbering(payload)
        .replace('（', "(")
        .replace('）', ")");
    let (song, artist) = split_song_artist(&payload);
    let song = strip_leading_numbering(&song);
    if !is_valid_song_entry(&song) {
        return;
    }
    entries.push(TimestampLine {
        offset_s,
        song,
        artist: artist.filter(|a| !a.is_empty()),
        raw: raw.to_string(),
    });
}

static BY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(.*?) by (.*)$").expect("by regex"));
static PAREN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\(([^)]+)\)\s*$").expect("paren regex"));

/// Split a payload into `(song, artist)`, first matching rule wins.
fn split_song_artist(payload: &str) -> (String, Option<String>) {
    // 1. exactly one slash
    if payload.matches('/').count() == 1 {
        let (left, right) = payload.split_once('/').expect("one slash present");
        return (left.trim().to_string(), non_empty(right.trim()));
    }
    // 2. hyphen with surrounding whitespace
    if let Some((left, right)) = payload.split_once(" - ") {
        return (left.trim().to_string(), non_empty(right.trim()));
    }
    // 3. "song by artist", case-insensitive
    if let Some(caps) = BY_RE.captures(payload) {
        let left = caps.get(1).map_or("", |m| m.as_str()).trim();
        let right = caps.get(2).map_or("", |m| m.as_str()).trim();
        if !left.is_empty() && !right.is_empty() {
            return (left.to_string(), Some(right.to_string()));
        }
    }
    // 4. trailing parenthetical that looks like an artist
    if let Some(caps) = PAREN_RE.captures(payload) {
        let song = caps.get(1).map_or("", |m| m.as_str()).trim();
        let artist = caps.get(2).map_or("", |m| m.as_str()).trim();
        if !song.is_empty() && !artist.is_empty() && !ANCHOR_RE.is_match(artist) {
            return (song.to_string(), Some(artist.to_string()));
        }
    }
    // 5. song only
    (payload.trim().to_string(), None)
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Drop entries that jump backwards past the tolerance and collapse
/// duplicate offsets onto the first occurrence.
fn monotonicity_filter(entries: Vec<TimestampLine>) -> Vec<TimestampLine> {
    let mut retained: Vec<TimestampLine> = Vec::with_capacity(entries.len());
    for entry in entries {
        if let Some(prev) = retained.last() {
            if entry.offset_s + MONOTONICITY_TOLERANCE_S < prev.offset_s {
                continue;
            }
            if entry.offset_s == prev.offset_s {
                continue;
            }
        }
        retained.push(entry);
    }
    retained
}

/// Candidate quality: `0.5·artist_ratio + 0.3·count_term + 0.2·density_term`.
///
/// Returns `(quality, artist_ratio)`; the artist ratio is also a
/// confidence-scorer signal.
pub fn score_quality(lines: &[TimestampLine]) -> (f64, f64) {
    if lines.is_empty() {
        return (0.0, 0.0);
    }
    let n = lines.len();
    let with_artist = lines.iter().filter(|l| l.artist.is_some()).count();
    let artist_ratio = with_artist as f64 / n as f64;
    let count_term = (n as f64 / 15.0).min(1.0);
    let density_term = density_term(lines);
    let quality = 0.5 * artist_ratio + 0.3 * count_term + 0.2 * density_term;
    (quality, artist_ratio)
}

/// Density of the setlist: 1.0 when the median gap between consecutive
/// offsets sits in the typical song range [120s, 420s], decaying linearly
/// to 0 at the support edges [30s, 1200s].
fn density_term(lines: &[TimestampLine]) -> f64 {
    if lines.len() < 2 {
        return 0.0;
    }
    let mut gaps: Vec<u32> = lines
        .windows(2)
        .map(|w| w[1].offset_s.saturating_sub(w[0].offset_s))
        .collect();
    gaps.sort_unstable();
    let median = if gaps.len() % 2 == 1 {
        gaps[gaps.len() / 2] as f64
    } else {
        (gaps[gaps.len() / 2 - 1] as f64 + gaps[gaps.len() / 2] as f64) / 2.0
    };

    if (120.0..=420.0).contains(&median) {
        1.0
    } else if (30.0..120.0).contains(&median) {
        (median - 30.0) / 90.0
    } else if median > 420.0 && median <= 1200.0 {
        (1200.0 - median) / 780.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> CandidateSetlist {
        parse_candidate(text, Origin::Description)
    }

    #[test]
    fn test_slash_setlist() {
        let text = "0:00 opening\n1:23 夜に駆ける / YOASOBI\n5:47 千本桜 / 初音ミク\n";
        let candidate = parse(text);
        assert_eq!(candidate.lines.len(), 3);
        assert_eq!(candidate.lines[0].song, "opening");
        assert_eq!(candidate.lines[0].artist, None);
        assert_eq!(candidate.lines[1].offset_s, 83);
        assert_eq!(candidate.lines[1].song, "夜に駆ける");
        assert_eq!(candidate.lines[1].artist.as_deref(), Some("YOASOBI"));
        assert_eq!(candidate.lines[2].artist.as_deref(), Some("初音ミク"));
    }

    #[test]
    fn test_anchor_forms() {
        let candidate = parse("00:25:36 夜に駆ける / YOASOBI");
        assert_eq!(candidate.lines[0].offset_s, 1536);
        let candidate = parse("125:10 ロングメドレー");
        assert_eq!(candidate.lines[0].offset_s, 7510);
    }

    #[test]
    fn test_first_match_is_the_anchor() {
        let candidate = parse("1:23 間奏 10:00 で再開");
        assert_eq!(candidate.lines[0].offset_s, 83);
        assert_eq!(candidate.lines[0].song, "間奏 10:00 で再開");
    }

    #[test]
    fn test_glued_digits_are_not_anchors() {
        // "12:345" is not a timestamp; neither side of a glued digit run is
        let candidate = parse("12:345 something");
        assert!(candidate.lines.is_empty());
    }

    #[test]
    fn test_separator_consumption() {
        for text in [
            "1:23 - 曲名A",
            "1:23- 曲名A",
            "1:23：曲名A",
            "1:23・曲名A",
            "1:23）曲名A",
        ] {
            let candidate = parse(text);
            assert_eq!(candidate.lines.len(), 1, "input {:?}", text);
            assert_eq!(candidate.lines[0].song, "曲名A", "input {:?}", text);
        }
    }

    #[test]
    fn test_hyphen_split() {
        let candidate = parse("1:23 アイドル - YOASOBI");
        assert_eq!(candidate.lines[0].song, "アイドル");
        assert_eq!(candidate.lines[0].artist.as_deref(), Some("YOASOBI"));
    }

    #[test]
    fn test_by_split_case_insensitive() {
        let candidate = parse("1:23 Lemon BY 米津玄師");
        assert_eq!(candidate.lines[0].song, "Lemon");
        assert_eq!(candidate.lines[0].artist.as_deref(), Some("米津玄師"));
    }

    #[test]
    fn test_paren_split() {
        let candidate = parse("1:23 白日（King Gnu）");
        assert_eq!(candidate.lines[0].song, "白日");
        assert_eq!(candidate.lines[0].artist.as_deref(), Some("King Gnu"));
    }

    #[test]
    fn test_paren_with_timestamp_is_not_artist() {
        let candidate = parse("1:23 雑曲メモ(3:45)");
        assert_eq!(candidate.lines[0].song, "雑曲メモ(3:45)");
        assert_eq!(candidate.lines[0].artist, None);
    }

    #[test]
    fn test_slash_rule_precedes_hyphen() {
        let candidate = parse("1:23 曲A / 歌手 - ユニット");
        assert_eq!(candidate.lines[0].song, "曲A");
        assert_eq!(candidate.lines[0].artist.as_deref(), Some("歌手 - ユニット"));
    }

    #[test]
    fn test_two_slashes_fall_through_to_song_only() {
        let candidate = parse("1:23 A/B/C");
        assert_eq!(candidate.lines[0].song, "A/B/C");
        assert_eq!(candidate.lines[0].artist, None);
    }

    #[test]
    fn test_pending_anchor_adopts_next_line() {
        let text = "1:12\n青と夏 / Mrs. GREEN APPLE\n7:22\n八月の夜 / SILENT SIREN\n";
        let candidate = parse(text);
        assert_eq!(candidate.lines.len(), 2);
        assert_eq!(candidate.lines[0].offset_s, 72);
        assert_eq!(candidate.lines[0].song, "青と夏");
        assert_eq!(candidate.lines[1].song, "八月の夜");
    }

    #[test]
    fn test_numbering_stripped_before_split() {
        let candidate = parse("1:23 01. 夜に駆ける / YOASOBI");
        assert_eq!(candidate.lines[0].song, "夜に駆ける");
    }

    #[test]
    fn test_list_headers_dropped() {
        let candidate = parse("0:00 セトリはこちら\n1:23 夜に駆ける / YOASOBI");
        assert_eq!(candidate.lines.len(), 1);
        assert_eq!(candidate.lines[0].song, "夜に駆ける");
    }

    #[test]
    fn test_html_comment_text() {
        let text = r#"<a href="https://www.youtube.com/watch?v=x&amp;t=83">1:23</a> 夜に駆ける / YOASOBI<br>5:47 千本桜 / 初音ミク"#;
        let candidate = parse(text);
        assert_eq!(candidate.lines.len(), 2);
        assert_eq!(candidate.lines[0].offset_s, 83);
        assert_eq!(candidate.lines[1].offset_s, 347);
    }

    #[test]
    fn test_monotonicity_drops_backward_jump() {
        // 3:00, 5:00, then a stray 3:20 annotation, then 7:00
        let text = "3:00 曲一\n5:00 曲二\n3:20 曲三\n7:00 曲四\n";
        let candidate = parse(text);
        let offsets: Vec<u32> = candidate.lines.iter().map(|l| l.offset_s).collect();
        assert_eq!(offsets, vec![180, 300, 420]);
    }

    #[test]
    fn test_monotonicity_tolerates_small_jitter() {
        let text = "3:00 曲一\n2:57 曲二\n5:00 曲三\n";
        let candidate = parse(text);
        assert_eq!(candidate.lines.len(), 3);
    }

    #[test]
    fn test_equal_offsets_collapse_to_first() {
        let text = "3:00 曲一\n3:00 曲一ふたたび\n5:00 曲二\n";
        let candidate = parse(text);
        assert_eq!(candidate.lines.len(), 2);
        assert_eq!(candidate.lines[0].song, "曲一");
    }

    #[test]
    fn test_quality_all_artists_good_density() {
        // 12 lines, 3-minute gaps, every line has an artist
        let text: String = (0..12)
            .map(|i| format!("{}:00 曲{} / 歌手{}\n", i * 3, i, i))
            .collect();
        let candidate = parse(&text);
        assert_eq!(candidate.lines.len(), 12);
        assert!((candidate.artist_ratio - 1.0).abs() < 1e-9);
        // 0.5·1.0 + 0.3·(12/15) + 0.2·1.0 = 0.94
        assert!((candidate.quality - 0.94).abs() < 1e-9);
    }

    #[test]
    fn test_quality_zero_for_empty() {
        let candidate = parse("no timestamps at all");
        assert!(candidate.is_empty());
        assert_eq!(candidate.quality, 0.0);
    }

    #[test]
    fn test_density_term_decay() {
        let mk = |gap_s: u32, n: u32| -> Vec<TimestampLine> {
            (0..n)
                .map(|i| TimestampLine {
                    offset_s: i * gap_s,
                    song: format!("s{}", i),
                    artist: None,
                    raw: String::new(),
                })
                .collect()
        };
        // median 300 → flat top
        assert!((density_term(&mk(300, 5)) - 1.0).abs() < 1e-9);
        // median 75 → halfway up the rising edge
        assert!((density_term(&mk(75, 5)) - 0.5).abs() < 1e-9);
        // median 810 → halfway down the falling edge
        assert!((density_term(&mk(810, 5)) - 0.5).abs() < 1e-9);
        // out of support
        assert_eq!(density_term(&mk(10, 5)), 0.0);
        assert_eq!(density_term(&mk(2000, 5)), 0.0);
    }
}

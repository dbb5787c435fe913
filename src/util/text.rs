//! Text normalization for song and artist strings
//!
//! Three concerns live here: the catalog's search key (NFKC + case and
//! whitespace folding), the kana reading used for locale-aware ordering,
//! and the cleanup of viewer-typed decoration (leading numbering, bullet
//! glyphs, HTML remnants) before the song/artist split.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// NFKC-fold, lowercase, and whitespace-normalize a string.
///
/// Full-width digits and ASCII collapse to their half-width forms under
/// NFKC; runs of whitespace (including ideographic space) collapse to a
/// single ASCII space; the result is trimmed.
pub fn normalize_key(s: &str) -> String {
    let folded: String = s.nfkc().collect::<String>().to_lowercase();
    let mut out = String::with_capacity(folded.len());
    let mut pending_space = false;
    for ch in folded.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(ch);
        }
    }
    out
}

/// Fold katakana to hiragana so kana spellings of the same word compare
/// equal. Applied on top of [`normalize_key`] to build ordering keys.
pub fn kana_fold(s: &str) -> String {
    s.chars()
        .map(|ch| match ch {
            // ァ (30A1) through ヶ (30F6) sit exactly 0x60 above their
            // hiragana counterparts
            '\u{30A1}'..='\u{30F6}' => {
                char::from_u32(ch as u32 - 0x60).unwrap_or(ch)
            }
            // prolonged sound mark and iteration marks stay as-is
            _ => ch,
        })
        .collect()
}

/// Ordering key for song/artist columns: kana-folded normalized form.
pub fn collation_key(s: &str) -> String {
    kana_fold(&normalize_key(s))
}

/// Fold full-width digits to ASCII without touching anything else.
pub fn fold_width_digits(s: &str) -> String {
    s.chars()
        .map(|ch| match ch {
            '０'..='９' => char::from_u32('0' as u32 + (ch as u32 - '０' as u32)).unwrap_or(ch),
            _ => ch,
        })
        .collect()
}

static BR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("br regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));

/// Convert `<br>` tags to newlines and strip remaining HTML tags.
///
/// Comment text fetched as display HTML carries timestamp anchors and line
/// breaks as markup; after this pass the plain-line grammar applies.
pub fn strip_html(s: &str) -> String {
    let with_breaks = BR_RE.replace_all(s, "\n");
    TAG_RE
        .replace_all(&with_breaks, "")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

static NUMBERING_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // "01." "01。" "1)" "1】" "1-" "1・" and friends
        Regex::new(r"^\s*\d{1,3}[\.。．:：\)）\]】\-ー・]+\s*").expect("numbering regex"),
        // "(1)" "【1】" "[1]" "（1）"
        Regex::new(r"^\s*[\(（【\[]\s*\d{1,3}\s*[\)）】\]]\s*").expect("bracket numbering regex"),
        // "01 " bare number plus space
        Regex::new(r"^\s*\d{1,3}\s+").expect("bare numbering regex"),
        // "第1曲" "第2首"
        Regex::new(r"^\s*第?\d{1,3}[曲首話回章]\s*").expect("counter numbering regex"),
    ]
});

static DECORATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[&＆※★☆■□◆◇●○▲△▼▽➤➡→⇒►▶・]+\s*").expect("decoration regex")
});

/// Strip leading track numbering and decoration glyphs from a payload.
///
/// Viewer setlists routinely prefix entries with `01.`, `(1)`, `【1】` or
/// bullet marks; several prefixes can stack, so the patterns reapply until
/// a pass changes nothing (bounded at three passes).
pub fn strip_leading_numbering(s: &str) -> String {
    let mut text = fold_width_digits(s);
    for _ in 0..3 {
        let before = text.clone();
        for re in NUMBERING_RES.iter() {
            text = re.replace(&text, "").into_owned();
        }
        text = DECORATION_RE.replace(&text, "").into_owned();
        if text == before {
            break;
        }
    }
    text.trim().to_string()
}

static LIST_HEADER_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)^セトリ").expect("header regex"),
        Regex::new(r"(?i)^タイムスタンプ").expect("header regex"),
        Regex::new(r"(?i)^リスト").expect("header regex"),
        Regex::new(r"(?i)^曲目").expect("header regex"),
        Regex::new(r"(?i)^\d+曲目").expect("header regex"),
        Regex::new(r"(?i)^BGM").expect("header regex"),
    ]
});

static CJK_OR_ALPHA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Zぁ-んァ-ヶー一-龯]").expect("script regex"));
static DIGITS_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\d\s\.\-\(\)\[\]　]+$").expect("digits regex"));

/// Whether a cleaned `(song, artist)` pair is a plausible catalog entry.
///
/// Drops empty songs, digit/punctuation-only songs, very short songs with
/// no letter in any script, and list-header lines. Artist-less entries are
/// allowed; plenty of real setlists omit the artist.
pub fn is_valid_song_entry(song: &str) -> bool {
    let song = song.trim();
    if song.is_empty() {
        return false;
    }
    if DIGITS_ONLY_RE.is_match(song) {
        return false;
    }
    if song.chars().count() <= 2 && !CJK_OR_ALPHA_RE.is_match(song) {
        return false;
    }
    !LIST_HEADER_RES.iter().any(|re| re.is_match(song))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key_folds_width_and_case() {
        assert_eq!(normalize_key("ＹＯＡＳＯＢＩ"), "yoasobi");
        assert_eq!(normalize_key("  Mrs. GREEN　APPLE "), "mrs. green apple");
        assert_eq!(normalize_key("１２３"), "123");
    }

    #[test]
    fn test_kana_fold() {
        assert_eq!(kana_fold("サクラ"), "さくら");
        assert_eq!(kana_fold("ハルカ ミライ"), "はるか みらい");
        // prolonged sound mark untouched
        assert_eq!(kana_fold("ルーラ"), "るーら");
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("1:23<br>2:34"), "1:23\n2:34");
        assert_eq!(
            strip_html(r#"<a href="https://example.com/watch?v=x&amp;t=83">1:23</a> song"#),
            "1:23 song"
        );
    }

    #[test]
    fn test_strip_leading_numbering() {
        assert_eq!(strip_leading_numbering("01. 夜に駆ける"), "夜に駆ける");
        assert_eq!(strip_leading_numbering("（１）千本桜"), "千本桜");
        assert_eq!(strip_leading_numbering("【2】 アイドル"), "アイドル");
        assert_eq!(strip_leading_numbering("第3曲 残響散歌"), "残響散歌");
        // stacked prefixes fall in successive passes
        assert_eq!(strip_leading_numbering("01. 1) 曲名"), "曲名");
        assert_eq!(strip_leading_numbering("★ メルト"), "メルト");
        assert_eq!(strip_leading_numbering("曲名のみ"), "曲名のみ");
    }

    #[test]
    fn test_is_valid_song_entry() {
        assert!(is_valid_song_entry("夜に駆ける"));
        assert!(is_valid_song_entry("US")); // short but alphabetic
        assert!(!is_valid_song_entry(""));
        assert!(!is_valid_song_entry("01."));
        assert!(!is_valid_song_entry("12 34"));
        assert!(!is_valid_song_entry("セトリはこちら"));
        assert!(!is_valid_song_entry("タイムスタンプ一覧"));
        assert!(!is_valid_song_entry("BGMリスト"));
    }
}

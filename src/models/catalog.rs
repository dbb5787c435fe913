//! Catalog rows, the persisted unit of the canonical dataset

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::models::{TimestampLine, Video};
use crate::util::text::{collation_key, normalize_key};
use crate::util::time::render_hms;

/// Japan Standard Time as a fixed offset; stream dates are stated in JST.
pub fn jst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("JST offset")
}

/// One persisted catalog row.
///
/// `(video_id, offset_s)` is the primary key after merge. Rows are never
/// mutated in place; updates replace the row under the same key. The
/// 1-based `No` rank exists only at serialization and is not part of the
/// row.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRow {
    pub song: String,
    pub artist: Option<String>,
    /// Search key: NFKC-folded, lowercased, whitespace-normalized song
    pub normalized_song: String,
    pub genre: String,
    pub offset_s: u32,
    /// Stream date in JST, derived from the owning video's publish time
    pub stream_date: NaiveDate,
    pub video_id: String,
    pub channel_id: String,
    /// Singing-stream confidence in [0, 1], two-decimal precision
    pub confidence: f64,
}

impl CatalogRow {
    /// Build a row from a parsed line and its owning video.
    ///
    /// The channel id is taken from the video here, at extraction; it is
    /// never reconstructed later from the video id.
    pub fn from_line(video: &Video, line: &TimestampLine, genre: String, confidence: f64) -> Self {
        CatalogRow {
            normalized_song: normalize_key(&line.song),
            song: line.song.clone(),
            artist: line.artist.clone(),
            genre,
            offset_s: line.offset_s,
            stream_date: stream_date_jst(video.published_at),
            video_id: video.id.clone(),
            channel_id: video.channel_id.clone(),
            confidence: round2(confidence),
        }
    }

    /// Merge/dedupe key
    pub fn key(&self) -> (String, u32) {
        (self.video_id.clone(), self.offset_s)
    }

    /// Rendered timestamp column: `H:MM:SS` above one hour, `M:SS` below
    pub fn timestamp_hms(&self) -> String {
        render_hms(self.offset_s)
    }

    /// Normalized artist for global dedupe; empty when artist is absent
    pub fn normalized_artist(&self) -> String {
        self.artist.as_deref().map(normalize_key).unwrap_or_default()
    }

    pub fn artist_str(&self) -> &str {
        self.artist.as_deref().unwrap_or("")
    }
}

/// Round a confidence value to the catalog's two-decimal precision.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Convert a UTC publish instant to the JST calendar date.
pub fn stream_date_jst(published_at: DateTime<Utc>) -> NaiveDate {
    published_at.with_timezone(&jst()).date_naive()
}

/// Catalog serialization orders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    DateDesc,
    DateAsc,
    SongAsc,
    ArtistAsc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<SortOrder> {
        match s {
            "date-desc" => Some(SortOrder::DateDesc),
            "date-asc" => Some(SortOrder::DateAsc),
            "song-asc" => Some(SortOrder::SongAsc),
            "artist-asc" => Some(SortOrder::ArtistAsc),
            _ => None,
        }
    }
}

/// Sort rows in place.
///
/// Song/artist orderings compare kana-folded normalized keys so katakana
/// and hiragana spellings interleave the way the front-end expects; ties
/// fall back to `(stream_date, video_id, offset)` for determinism.
pub fn sort_rows(rows: &mut [CatalogRow], order: SortOrder) {
    match order {
        SortOrder::DateAsc => rows.sort_by(|a, b| {
            (a.stream_date, &a.video_id, a.offset_s).cmp(&(b.stream_date, &b.video_id, b.offset_s))
        }),
        SortOrder::DateDesc => rows.sort_by(|a, b| {
            b.stream_date
                .cmp(&a.stream_date)
                .then_with(|| a.video_id.cmp(&b.video_id))
                .then_with(|| a.offset_s.cmp(&b.offset_s))
        }),
        SortOrder::SongAsc => rows.sort_by(|a, b| {
            collation_key(&a.song)
                .cmp(&collation_key(&b.song))
                .then_with(|| {
                    (a.stream_date, &a.video_id, a.offset_s)
                        .cmp(&(b.stream_date, &b.video_id, b.offset_s))
                })
        }),
        SortOrder::ArtistAsc => rows.sort_by(|a, b| {
            collation_key(a.artist_str())
                .cmp(&collation_key(b.artist_str()))
                .then_with(|| {
                    (a.stream_date, &a.video_id, a.offset_s)
                        .cmp(&(b.stream_date, &b.video_id, b.offset_s))
                })
        }),
    }
}

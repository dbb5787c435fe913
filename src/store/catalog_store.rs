//! Canonical catalog store
//!
//! The catalog is an ordered sequence of rows with `(video_id, offset_s)`
//! as the primary key. The on-disk form is UTF-8-with-BOM CSV with a
//! fixed header; that header is a stability contract with the front-end
//! export and must never drift.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::catalog::{round2, sort_rows};
use crate::models::{CatalogRow, SortOrder};
use crate::store::atomic::write_atomic;
use crate::util::time::parse_hms;

/// The canonical header. Column order and spelling are frozen.
pub const CATALOG_HEADER: [&str; 10] = [
    "No",
    "曲",
    "歌手-ユニット",
    "検索用",
    "ジャンル",
    "タイムスタンプ",
    "配信日",
    "動画ID",
    "確度スコア",
    "チャンネルID",
];

const BOM: &str = "\u{feff}";

#[derive(Debug, Default, Clone, Copy)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Debug, Default)]
pub struct Catalog {
    rows: Vec<CatalogRow>,
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog::default()
    }

    pub fn rows(&self) -> &[CatalogRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Read the canonical file; a missing file is an empty catalog.
    pub fn load(path: &Path) -> Result<Catalog> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Catalog::new());
            }
            Err(e) => return Err(Error::Io(e)),
        };
        let content = content.strip_prefix(BOM).unwrap_or(&content);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| Error::Parse(format!("{}: {}", path.display(), e)))?
            .clone();
        if headers.iter().collect::<Vec<_>>() != CATALOG_HEADER {
            return Err(Error::Integrity(format!(
                "catalog header mismatch in {}",
                path.display()
            )));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| Error::Parse(format!("{}: {}", path.display(), e)))?;
            rows.push(parse_record(&record)?);
        }
        debug!(rows = rows.len(), "catalog loaded");
        Ok(Catalog { rows })
    }

    /// Insert rows with new keys; replace an existing row only when the
    /// newcomer has strictly higher confidence or fills an empty artist.
    ///
    /// All incoming rows are validated first; an invariant violation
    /// aborts the merge and leaves the catalog untouched.
    pub fn merge(&mut self, new_rows: Vec<CatalogRow>) -> Result<MergeOutcome> {
        for row in &new_rows {
            validate_row(row)?;
        }

        let mut index: HashMap<(String, u32), usize> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.key(), i))
            .collect();
        if index.len() != self.rows.len() {
            return Err(Error::Integrity(
                "duplicate (video_id, offset) in existing catalog".to_string(),
            ));
        }

        let mut outcome = MergeOutcome::default();
        for row in new_rows {
            match index.get(&row.key()) {
                None => {
                    index.insert(row.key(), self.rows.len());
                    self.rows.push(row);
                    outcome.inserted += 1;
                }
                Some(&at) => {
                    let existing = &self.rows[at];
                    let fills_artist = existing.artist.is_none() && row.artist.is_some();
                    if row.confidence > existing.confidence || fills_artist {
                        self.rows[at] = row;
                        outcome.updated += 1;
                    }
                }
            }
        }
        Ok(outcome)
    }

    /// Collapse rows sharing `(normalized_song, normalized_artist,
    /// video_id)` into the highest-confidence one; ties keep the earliest
    /// offset. Returns the number of rows removed.
    pub fn dedupe_global(&mut self) -> usize {
        let mut best: HashMap<(String, String, String), usize> = HashMap::new();
        for (i, row) in self.rows.iter().enumerate() {
            let key = (
                row.normalized_song.clone(),
                row.normalized_artist(),
                row.video_id.clone(),
            );
            match best.get(&key) {
                None => {
                    best.insert(key, i);
                }
                Some(&at) => {
                    let held = &self.rows[at];
                    let wins = row.confidence > held.confidence
                        || (row.confidence == held.confidence && row.offset_s < held.offset_s);
                    if wins {
                        best.insert(key, i);
                    }
                }
            }
        }
        let keep: std::collections::HashSet<usize> = best.into_values().collect();
        let before = self.rows.len();
        let mut i = 0;
        self.rows.retain(|_| {
            let kept = keep.contains(&i);
            i += 1;
            kept
        });
        let removed = before - self.rows.len();
        if removed > 0 {
            info!(removed, "global dedupe collapsed rows");
        }
        removed
    }

    pub fn sort(&mut self, order: SortOrder) {
        sort_rows(&mut self.rows, order);
    }

    /// Re-run classification over existing rows.
    ///
    /// `classify` returns the new genre for a row, or `None` to leave it
    /// as-is. Row order is preserved so an unchanged catalog re-saves
    /// byte-identically. Returns the number of rows that changed.
    pub fn reclassify<F>(&mut self, mut classify: F) -> usize
    where
        F: FnMut(&CatalogRow) -> Option<String>,
    {
        let mut changed = 0;
        for row in &mut self.rows {
            if let Some(genre) = classify(row) {
                if genre != row.genre {
                    row.genre = genre;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Write the canonical file atomically. The 1-based `No` column is
    /// assigned here, from the current row order.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        writer
            .write_record(CATALOG_HEADER)
            .map_err(|e| Error::Parse(format!("writing catalog header: {}", e)))?;
        for (i, row) in self.rows.iter().enumerate() {
            writer
                .write_record([
                    (i + 1).to_string(),
                    row.song.clone(),
                    row.artist_str().to_string(),
                    row.normalized_song.clone(),
                    row.genre.clone(),
                    row.timestamp_hms(),
                    row.stream_date.format("%Y-%m-%d").to_string(),
                    row.video_id.clone(),
                    format!("{:.2}", row.confidence),
                    row.channel_id.clone(),
                ])
                .map_err(|e| Error::Parse(format!("writing catalog row: {}", e)))?;
        }
        let body = writer
            .into_inner()
            .map_err(|e| Error::Parse(format!("flushing catalog: {}", e)))?;

        let mut bytes = Vec::with_capacity(body.len() + BOM.len());
        bytes.extend_from_slice(BOM.as_bytes());
        bytes.extend_from_slice(&body);
        write_atomic(path, &bytes)
    }
}

fn parse_record(record: &csv::StringRecord) -> Result<CatalogRow> {
    let field = |i: usize| record.get(i).unwrap_or("").to_string();

    let offset_s = parse_hms(&field(5))
        .ok_or_else(|| Error::Parse(format!("bad timestamp column: {:?}", field(5))))?;
    let stream_date = parse_stream_date(&field(6))?;
    let confidence: f64 = field(8)
        .parse()
        .map_err(|_| Error::Parse(format!("bad confidence column: {:?}", field(8))))?;

    let artist = field(2);
    let row = CatalogRow {
        song: field(1),
        artist: (!artist.is_empty()).then_some(artist),
        normalized_song: field(3),
        genre: field(4),
        offset_s,
        stream_date,
        video_id: field(7),
        channel_id: field(9),
        confidence: round2(confidence),
    };
    Ok(row)
}

/// Dates are written ISO; slash-separated legacy exports still load.
fn parse_stream_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y/%m/%d"))
        .map_err(|_| Error::Parse(format!("bad stream date: {:?}", s)))
}

fn validate_row(row: &CatalogRow) -> Result<()> {
    if row.song.trim().is_empty() {
        return Err(Error::Integrity(format!(
            "empty song for video {} at {}",
            row.video_id, row.offset_s
        )));
    }
    if row.video_id.is_empty() || row.channel_id.is_empty() {
        return Err(Error::Integrity(format!(
            "missing ids on row {:?}",
            row.song
        )));
    }
    if !(0.0..=1.0).contains(&row.confidence) {
        return Err(Error::Integrity(format!(
            "confidence out of range: {} on video {}",
            row.confidence, row.video_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(video_id: &str, offset_s: u32, song: &str, confidence: f64) -> CatalogRow {
        CatalogRow {
            song: song.to_string(),
            artist: Some("歌手".to_string()),
            normalized_song: crate::util::text::normalize_key(song),
            genre: "その他".to_string(),
            offset_s,
            stream_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            video_id: video_id.to_string(),
            channel_id: "UCHM_SLi7s0AJ8UBmm3pWN6Q".to_string(),
            confidence,
        }
    }

    #[test]
    fn test_missing_file_is_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::load(&dir.path().join("catalog.csv")).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.csv");

        let mut catalog = Catalog::new();
        catalog
            .merge(vec![
                row("dQw4w9WgXcQ", 83, "夜に駆ける", 0.88),
                row("dQw4w9WgXcQ", 3661, "千本桜", 0.88),
            ])
            .unwrap();
        catalog.save(&path).unwrap();

        let raw = std::fs::read(&path).unwrap();
        // BOM then the contract header
        assert!(raw.starts_with("\u{feff}No,曲,歌手-ユニット".as_bytes()));

        let reloaded = Catalog::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.rows()[0].song, "夜に駆ける");
        assert_eq!(reloaded.rows()[1].offset_s, 3661);
        assert_eq!(reloaded.rows()[1].timestamp_hms(), "1:01:01");
    }

    #[test]
    fn test_header_mismatch_is_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.csv");
        std::fs::write(&path, "a,b,c\n1,2,3\n").unwrap();
        assert!(matches!(Catalog::load(&path), Err(Error::Integrity(_))));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut catalog = Catalog::new();
        let rows = vec![
            row("dQw4w9WgXcQ", 83, "夜に駆ける", 0.88),
            row("dQw4w9WgXcQ", 347, "千本桜", 0.88),
        ];
        let first = catalog.merge(rows.clone()).unwrap();
        assert_eq!(first.inserted, 2);
        let second = catalog.merge(rows).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_merge_updates_only_on_higher_confidence() {
        let mut catalog = Catalog::new();
        catalog.merge(vec![row("dQw4w9WgXcQ", 83, "夜に駆ける", 0.50)]).unwrap();

        // same key, lower confidence: ignored
        catalog.merge(vec![row("dQw4w9WgXcQ", 83, "よるにかける", 0.40)]).unwrap();
        assert_eq!(catalog.rows()[0].song, "夜に駆ける");

        // same key, higher confidence: replaced
        let outcome = catalog.merge(vec![row("dQw4w9WgXcQ", 83, "よるにかける", 0.60)]).unwrap();
        assert_eq!(outcome.updated, 1);
        assert_eq!(catalog.rows()[0].song, "よるにかける");
    }

    #[test]
    fn test_merge_fills_empty_artist() {
        let mut catalog = Catalog::new();
        let mut bare = row("dQw4w9WgXcQ", 83, "夜に駆ける", 0.50);
        bare.artist = None;
        catalog.merge(vec![bare]).unwrap();

        // equal confidence but supplies the missing artist
        let outcome = catalog.merge(vec![row("dQw4w9WgXcQ", 83, "夜に駆ける", 0.50)]).unwrap();
        assert_eq!(outcome.updated, 1);
        assert_eq!(catalog.rows()[0].artist.as_deref(), Some("歌手"));
    }

    #[test]
    fn test_merge_rejects_invalid_confidence() {
        let mut catalog = Catalog::new();
        catalog.merge(vec![row("dQw4w9WgXcQ", 83, "夜に駆ける", 0.88)]).unwrap();
        let bad = CatalogRow {
            confidence: 1.5,
            ..row("AAAAAAAAAAA", 10, "曲", 0.5)
        };
        assert!(matches!(
            catalog.merge(vec![bad]),
            Err(Error::Integrity(_))
        ));
        // catalog untouched
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_primary_key_unique_after_merge() {
        let mut catalog = Catalog::new();
        catalog
            .merge(vec![
                row("dQw4w9WgXcQ", 83, "夜に駆ける", 0.5),
                row("dQw4w9WgXcQ", 83, "夜に駆ける(高音質)", 0.9),
                row("dQw4w9WgXcQ", 347, "千本桜", 0.5),
            ])
            .unwrap();
        let mut keys: Vec<_> = catalog.rows().iter().map(|r| r.key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), catalog.len());
        // the duplicate key kept the higher-confidence payload
        assert_eq!(catalog.rows()[0].song, "夜に駆ける(高音質)");
    }

    #[test]
    fn test_dedupe_global_keeps_highest_confidence() {
        let mut catalog = Catalog::new();
        catalog
            .merge(vec![
                row("dQw4w9WgXcQ", 83, "夜に駆ける", 0.50),
                row("dQw4w9WgXcQ", 2000, "夜に駆ける", 0.90),
                row("AAAAAAAAAAA", 83, "夜に駆ける", 0.50),
            ])
            .unwrap();
        catalog.dedupe_global();
        // same song+artist in the same video collapses; other video stays
        assert_eq!(catalog.len(), 2);
        let kept: Vec<_> = catalog
            .rows()
            .iter()
            .filter(|r| r.video_id == "dQw4w9WgXcQ")
            .collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].offset_s, 2000);
    }

    #[test]
    fn test_dedupe_tie_keeps_earliest_offset() {
        let mut catalog = Catalog::new();
        catalog
            .merge(vec![
                row("dQw4w9WgXcQ", 2000, "夜に駆ける", 0.50),
                row("dQw4w9WgXcQ", 83, "夜に駆ける", 0.50),
            ])
            .unwrap();
        catalog.dedupe_global();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.rows()[0].offset_s, 83);
    }

    #[test]
    fn test_no_column_reflects_serialization_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.csv");
        let mut catalog = Catalog::new();
        catalog
            .merge(vec![
                row("dQw4w9WgXcQ", 347, "b曲", 0.5),
                row("dQw4w9WgXcQ", 83, "a曲", 0.5),
            ])
            .unwrap();
        catalog.sort(SortOrder::DateAsc);
        catalog.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[1].starts_with("1,a曲"));
        assert!(lines[2].starts_with("2,b曲"));
    }
}

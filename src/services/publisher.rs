//! Front-end JSON projection
//!
//! Projects the in-memory catalog into the two documents the static
//! front-end reads (singing-only and all-mode) plus the channel manifest.
//! Row keys mirror the catalog columns byte-for-byte; the front-end
//! indexes by the Japanese names.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::info;

use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::store::atomic::write_atomic;
use crate::store::Catalog;

#[derive(Debug, Clone, Copy)]
pub struct PublishStats {
    pub total_rows: usize,
    pub singing_rows: usize,
}

/// Write `timestamps_singing.json`, `timestamps_all.json`, and
/// `channels.json` into `out_dir`. All writes are atomic.
///
/// `run_started` becomes `last_updated` in both documents, so a no-op
/// incremental run still visibly refreshes the site.
pub fn publish(
    catalog: &Catalog,
    channels: &[&ChannelConfig],
    out_dir: &Path,
    confidence_threshold: f64,
    run_started: DateTime<Utc>,
) -> Result<PublishStats> {
    let all_rows: Vec<&crate::models::CatalogRow> = catalog.rows().iter().collect();
    let singing_rows: Vec<&crate::models::CatalogRow> = catalog
        .rows()
        .iter()
        .filter(|r| r.confidence >= confidence_threshold)
        .collect();

    let stats = PublishStats {
        total_rows: all_rows.len(),
        singing_rows: singing_rows.len(),
    };

    write_document(
        &out_dir.join("timestamps_singing.json"),
        &singing_rows,
        run_started,
    )?;
    write_document(&out_dir.join("timestamps_all.json"), &all_rows, run_started)?;
    write_channels(&out_dir.join("channels.json"), channels)?;

    info!(
        total = stats.total_rows,
        singing = stats.singing_rows,
        out_dir = %out_dir.display(),
        "published front-end JSONs"
    );
    Ok(stats)
}

fn write_document(
    path: &Path,
    rows: &[&crate::models::CatalogRow],
    run_started: DateTime<Utc>,
) -> Result<()> {
    let mut channel_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for row in rows {
        *channel_counts.entry(row.channel_id.as_str()).or_default() += 1;
    }

    let timestamps: Vec<Value> = rows
        .iter()
        .map(|row| {
            json!({
                "曲": row.song,
                "歌手-ユニット": row.artist_str(),
                "検索用": row.normalized_song,
                "ジャンル": row.genre,
                "タイムスタンプ": row.timestamp_hms(),
                "配信日": row.stream_date.format("%Y-%m-%d").to_string(),
                "動画ID": row.video_id,
                "確度スコア": format!("{:.2}", row.confidence),
                "チャンネルID": row.channel_id,
            })
        })
        .collect();

    let document = json!({
        "last_updated": run_started.to_rfc3339_opts(SecondsFormat::Secs, true),
        "total_count": rows.len(),
        "channel_counts": channel_counts,
        "timestamps": timestamps,
    });

    let body = serde_json::to_vec_pretty(&document)
        .map_err(|e| Error::Parse(format!("serializing {}: {}", path.display(), e)))?;
    write_atomic(path, &body)
}

/// Channel manifest in config order.
fn write_channels(path: &Path, channels: &[&ChannelConfig]) -> Result<()> {
    let list: Vec<Value> = channels
        .iter()
        .map(|ch| {
            let mut entry = json!({
                "id": ch.channel_id,
                "name": ch.name,
            });
            if let Some(thumbnail_url) = &ch.thumbnail_url {
                entry["thumbnail_url"] = json!(thumbnail_url);
            }
            entry
        })
        .collect();
    let body = serde_json::to_vec_pretty(&list)
        .map_err(|e| Error::Parse(format!("serializing {}: {}", path.display(), e)))?;
    write_atomic(path, &body)
}

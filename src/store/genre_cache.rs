//! Persistent genre lookup cache
//!
//! Maps `(artist, song)` to the genre the external metadata service
//! answered, with a TTL so stale community tags eventually refresh.
//! Saved atomically under the advisory lock; safe against concurrent
//! runs on the same state directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::atomic::{write_atomic, FileLock};

pub const DEFAULT_TTL_DAYS: i64 = 30;

const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    artist: String,
    song: String,
    genre: String,
    fetched_at: DateTime<Utc>,
    #[serde(default = "default_ttl")]
    ttl_days: i64,
}

fn default_ttl() -> i64 {
    DEFAULT_TTL_DAYS
}

pub struct GenreCache {
    path: PathBuf,
    entries: HashMap<(String, String), CacheEntry>,
    dirty: bool,
}

impl GenreCache {
    /// Load the cache; a missing file is an empty cache.
    pub fn load(path: &Path) -> Result<GenreCache> {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => {
                let list: Vec<CacheEntry> = serde_json::from_str(&content)
                    .map_err(|e| Error::Parse(format!("{}: {}", path.display(), e)))?;
                list.into_iter().map(|e| (key(&e.artist, &e.song), e)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(Error::Io(e)),
        };
        Ok(GenreCache {
            path: path.to_path_buf(),
            entries,
            dirty: false,
        })
    }

    /// Fresh cached genre for `(artist, song)`, if any.
    pub fn get(&self, artist: &str, song: &str) -> Option<&str> {
        let entry = self.entries.get(&key(artist, song))?;
        let age = Utc::now().signed_duration_since(entry.fetched_at);
        if age.num_days() >= entry.ttl_days {
            return None;
        }
        Some(&entry.genre)
    }

    pub fn insert(&mut self, artist: &str, song: &str, genre: &str) {
        self.entries.insert(
            key(artist, song),
            CacheEntry {
                artist: artist.to_string(),
                song: song.to_string(),
                genre: genre.to_string(),
                fetched_at: Utc::now(),
                ttl_days: DEFAULT_TTL_DAYS,
            },
        );
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persist the cache if anything changed since load.
    pub async fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let _lock = FileLock::acquire(&self.path, LOCK_TIMEOUT).await?;
        let mut list: Vec<&CacheEntry> = self.entries.values().collect();
        list.sort_by(|a, b| (&a.artist, &a.song).cmp(&(&b.artist, &b.song)));
        let body = serde_json::to_vec_pretty(&list)
            .map_err(|e| Error::Parse(format!("serializing genre cache: {}", e)))?;
        write_atomic(&self.path, &body)?;
        self.dirty = false;
        debug!(entries = self.entries.len(), "genre cache saved");
        Ok(())
    }
}

fn key(artist: &str, song: &str) -> (String, String) {
    (artist.to_lowercase(), song.to_lowercase())
}

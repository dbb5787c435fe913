//! Genre classification
//!
//! Layered rule engine, first match wins: exact artist mapping, keyword
//! categories in config order, exact song-title mapping, then the
//! optional external metadata tiebreaker (cached), and finally `その他`.
//! With the external lookup disabled the classifier is fully
//! deterministic over its config.

use std::sync::Arc;

use tracing::debug;

use crate::config::GenreConfig;
use crate::services::musicbrainz_client::MusicBrainzClient;
use crate::store::genre_cache::GenreCache;
use crate::util::text::normalize_key;

/// Fallback label when no rule matches.
pub const GENRE_OTHER: &str = "その他";

pub struct GenreClassifier {
    config: GenreConfig,
    /// Pre-folded keyword lists per category, in config order
    categories: Vec<(String, Vec<String>)>,
    lookup: Option<Arc<MusicBrainzClient>>,
}

impl GenreClassifier {
    pub fn new(config: GenreConfig) -> Self {
        let categories = config
            .categories
            .iter()
            .map(|(label, buckets)| {
                let mut keywords = Vec::new();
                if let Some(map) = buckets.as_object() {
                    for values in map.values() {
                        if let Some(list) = values.as_array() {
                            keywords.extend(
                                list.iter()
                                    .filter_map(|v| v.as_str())
                                    .map(normalize_key)
                                    .filter(|k| !k.is_empty()),
                            );
                        }
                    }
                }
                (label.clone(), keywords)
            })
            .collect();
        GenreClassifier {
            config,
            categories,
            lookup: None,
        }
    }

    /// Attach the external metadata tiebreaker.
    pub fn with_lookup(mut self, client: Arc<MusicBrainzClient>) -> Self {
        self.lookup = Some(client);
        self
    }

    /// Deterministic rules only (1-3 and the default).
    ///
    /// Returns `None` when nothing matched, so callers can decide whether
    /// to consult the external tiebreaker before settling on `その他`.
    pub fn classify_rules(&self, artist: &str, song: &str) -> Option<String> {
        // 1. exact artist mapping
        if !artist.is_empty() {
            if let Some(genre) = self.config.artist_to_genre.get(artist) {
                return Some(genre.clone());
            }
        }

        // 2. keyword categories, artist field first, then song
        let artist_key = normalize_key(artist);
        let song_key = normalize_key(song);
        for (label, keywords) in &self.categories {
            let hit = keywords
                .iter()
                .any(|kw| artist_key.contains(kw.as_str()) || song_key.contains(kw.as_str()));
            if hit {
                return Some(label.clone());
            }
        }

        // 3. exact song-title mapping
        if let Some(genre) = self.config.song_to_genre.get(song) {
            return Some(genre.clone());
        }

        None
    }

    /// Full classification: deterministic rules, then cache, then the
    /// external lookup, then the default.
    ///
    /// Lookup failures are never fatal; they just leave the row at the
    /// default label.
    pub async fn classify(&self, artist: &str, song: &str, cache: &mut GenreCache) -> String {
        if let Some(genre) = self.classify_rules(artist, song) {
            return genre;
        }

        let Some(client) = &self.lookup else {
            return GENRE_OTHER.to_string();
        };

        if let Some(genre) = cache.get(artist, song) {
            return genre.to_string();
        }

        match client.lookup_genre_tags(artist, song).await {
            Ok(tags) => {
                let genre = tags
                    .iter()
                    .find_map(|tag| self.config.genre_tag_map.get(&normalize_key(tag)))
                    .cloned()
                    .unwrap_or_else(|| GENRE_OTHER.to_string());
                cache.insert(artist, song, &genre);
                genre
            }
            Err(e) => {
                debug!(artist = %artist, song = %song, error = %e, "metadata lookup failed");
                GENRE_OTHER.to_string()
            }
        }
    }
}

//! MusicBrainz lookup (genre tiebreaker)
//!
//! Queries the MusicBrainz search API for `(artist, song)` and returns
//! the community genre tags of the best-scoring recording. Strictly a
//! tiebreaker after the deterministic rules; every failure degrades to
//! "no tags" and never escapes the owning row.
//!
//! Rate limit: 1 request/second per the MusicBrainz Terms of Service.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

const MUSICBRAINZ_API_URL: &str = "https://musicbrainz.org/ws/2";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// User-Agent header (required by MusicBrainz)
const USER_AGENT: &str = "utalog/0.1.0 (https://github.com/utalog/utalog)";

pub struct MusicBrainzClient {
    http_client: reqwest::Client,
    base_url: String,
    rate_limiter: DefaultDirectRateLimiter,
}

impl MusicBrainzClient {
    pub fn new() -> Self {
        Self::with_base_url(MUSICBRAINZ_API_URL)
    }

    /// Point the client at a different endpoint; tests use this.
    pub fn with_base_url(base_url: &str) -> Self {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(USER_AGENT),
        );
        let quota = Quota::per_second(NonZeroU32::new(1).expect("nonzero quota"));

        MusicBrainzClient {
            http_client: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .default_headers(headers)
                .build()
                .expect("HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::direct(quota),
        }
    }

    /// Fetch genre tags for `(artist, song)`, most-voted first.
    ///
    /// An empty result means "MusicBrainz has no opinion"; the caller
    /// falls back to the default genre.
    pub async fn lookup_genre_tags(&self, artist: &str, song: &str) -> Result<Vec<String>> {
        self.rate_limiter.until_ready().await;

        let query = if artist.is_empty() {
            format!("recording:\"{}\"", escape_lucene(song))
        } else {
            format!(
                "recording:\"{}\" AND artist:\"{}\"",
                escape_lucene(song),
                escape_lucene(artist)
            )
        };
        let url = format!("{}/recording", self.base_url);

        debug!(artist = %artist, song = %song, "querying MusicBrainz");
        let response = self
            .http_client
            .get(&url)
            .query(&[("query", query.as_str()), ("fmt", "json"), ("limit", "5")])
            .send()
            .await
            .map_err(|e| Error::Transient(format!("MusicBrainz request failed: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(Error::NotFound(format!("no recording for {}", song)));
        }
        if !status.is_success() {
            return Err(Error::Transient(format!(
                "MusicBrainz returned {}",
                status
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(format!("MusicBrainz response: {}", e)))?;

        let mut tags: Vec<Tag> = body
            .recordings
            .into_iter()
            .max_by_key(|r| r.score.unwrap_or(0))
            .and_then(|r| r.tags)
            .unwrap_or_default();
        tags.sort_by(|a, b| b.count.unwrap_or(0).cmp(&a.count.unwrap_or(0)));

        Ok(tags.into_iter().map(|t| t.name).collect())
    }
}

impl Default for MusicBrainzClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape the characters Lucene treats specially inside a quoted phrase.
fn escape_lucene(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// ============================================================================
// MusicBrainz API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    recordings: Vec<Recording>,
}

#[derive(Debug, Deserialize)]
struct Recording {
    #[allow(dead_code)]
    id: String,
    score: Option<u32>,
    tags: Option<Vec<Tag>>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
    count: Option<u32>,
}

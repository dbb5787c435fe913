//! Platform data API client
//!
//! Wraps the video platform's REST surface: channel upload listings,
//! batched video metadata, and top-level comment threads. One shared
//! client serves every channel worker, so the token-bucket rate limiter
//! and the quota counter live here.
//!
//! Retry policy: up to 3 attempts on transient failures (5xx, network
//! timeouts) with exponential backoff and jitter, base 1s, capped at 30s.
//! Quota exhaustion is never retried; it halts the whole run.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{Comment, Video, VideoRef};

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const PER_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Shared request rate, units per second.
const RATE_PER_SEC: u32 = 5;

/// Metadata batch size limit imposed by the API.
pub const VIDEO_BATCH_SIZE: usize = 50;

/// The seam the orchestrator drives; tests substitute an in-memory
/// implementation.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Enumerate uploads strictly newer than `since`, newest first,
    /// stopping at the watermark.
    async fn list_uploads(
        &self,
        channel_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<VideoRef>>;

    /// Batched metadata fetch.
    async fn get_videos(&self, ids: &[String]) -> Result<Vec<Video>>;

    /// Top-level comments by relevance, capped at `max`.
    async fn list_comments(&self, video_id: &str, max: usize) -> Result<Vec<Comment>>;
}

/// Advisory quota budget shared by every caller.
///
/// Estimated unit costs: upload listing 1, video batch 1, comment page 1.
/// Once the operator's ceiling is reached further calls fail with a
/// synthetic `QuotaExceeded` before touching the network.
pub struct QuotaTracker {
    used: AtomicU64,
    ceiling: u64,
}

impl QuotaTracker {
    pub fn new(ceiling: u64) -> Self {
        QuotaTracker {
            used: AtomicU64::new(0),
            ceiling,
        }
    }

    pub fn charge(&self, units: u64) -> Result<()> {
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let next = current + units;
            if next > self.ceiling {
                return Err(Error::QuotaExceeded(format!(
                    "quota budget exhausted ({}/{} units)",
                    current, self.ceiling
                )));
            }
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }
}

pub struct YouTubeClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    limiter: DefaultDirectRateLimiter,
    quota: QuotaTracker,
}

impl YouTubeClient {
    pub fn new(api_key: String, quota_ceiling: u64) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL, quota_ceiling)
    }

    /// Point the client at a different endpoint; tests use this.
    pub fn with_base_url(api_key: String, base_url: &str, quota_ceiling: u64) -> Self {
        let rate = Quota::per_second(NonZeroU32::new(RATE_PER_SEC).expect("nonzero rate"));
        YouTubeClient {
            http: reqwest::Client::builder()
                .timeout(PER_CALL_TIMEOUT)
                .build()
                .expect("HTTP client"),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::direct(rate),
            quota: QuotaTracker::new(quota_ceiling),
        }
    }

    pub fn quota_used(&self) -> u64 {
        self.quota.used()
    }

    /// One budgeted, rate-limited, retried GET returning parsed JSON.
    async fn call(&self, resource: &str, query: &[(&str, &str)], cost: u64) -> Result<serde_json::Value> {
        self.quota.charge(cost)?;
        let url = format!("{}/{}", self.base_url, resource);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.limiter.until_ready().await;

            let result = self
                .http
                .get(&url)
                .query(query)
                .query(&[("key", self.api_key.as_str())])
                .send()
                .await;

            let err = match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<serde_json::Value>().await.map_err(|e| {
                            Error::Parse(format!("{} response: {}", resource, e))
                        });
                    }
                    let body = response.text().await.unwrap_or_default();
                    classify_http_error(resource, status.as_u16(), &body)
                }
                Err(e) => Error::Transient(format!("{} request failed: {}", resource, e)),
            };

            if !err.is_transient() || attempt >= MAX_ATTEMPTS {
                return Err(err);
            }
            let backoff = backoff_with_jitter(attempt);
            warn!(
                resource,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// The uploads playlist holding a channel's full history.
    async fn uploads_playlist_id(&self, channel_id: &str) -> Result<String> {
        let value = self
            .call(
                "channels",
                &[("part", "contentDetails"), ("id", channel_id)],
                1,
            )
            .await?;
        let response: ChannelListResponse = parse_payload("channels", value)?;
        response
            .items
            .into_iter()
            .next()
            .map(|item| item.content_details.related_playlists.uploads)
            .ok_or_else(|| Error::NotFound(format!("channel {}", channel_id)))
    }
}

#[async_trait]
impl PlatformApi for YouTubeClient {
    async fn list_uploads(
        &self,
        channel_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<VideoRef>> {
        let playlist_id = self.uploads_playlist_id(channel_id).await?;
        let mut refs = Vec::new();
        let mut page_token: Option<String> = None;

        'pages: loop {
            let mut query = vec![
                ("part", "snippet"),
                ("playlistId", playlist_id.as_str()),
                ("maxResults", "50"),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.as_str()));
            }
            let value = self.call("playlistItems", &query, 1).await?;
            let response: PlaylistItemsResponse = parse_payload("playlistItems", value)?;

            for item in response.items {
                let published_at = item.snippet.published_at;
                if let Some(since) = since {
                    // the listing is newest-first; at the watermark the
                    // remaining pages are all old material
                    if published_at <= since {
                        break 'pages;
                    }
                }
                refs.push(VideoRef {
                    id: item.snippet.resource_id.video_id,
                    published_at,
                });
            }

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(channel_id, new_videos = refs.len(), "upload listing complete");
        Ok(refs)
    }

    async fn get_videos(&self, ids: &[String]) -> Result<Vec<Video>> {
        let mut videos = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(VIDEO_BATCH_SIZE) {
            let joined = chunk.join(",");
            let value = self
                .call(
                    "videos",
                    &[
                        ("part", "snippet,contentDetails,statistics"),
                        ("id", joined.as_str()),
                    ],
                    1,
                )
                .await?;
            let response: VideosResponse = parse_payload("videos", value)?;
            for item in response.items {
                videos.push(Video {
                    id: item.id,
                    channel_id: item.snippet.channel_id,
                    title: item.snippet.title,
                    description: item.snippet.description,
                    published_at: item.snippet.published_at,
                    duration_s: parse_iso8601_duration(&item.content_details.duration)
                        .unwrap_or(0),
                    view_count: parse_count(item.statistics.view_count),
                    comment_count: parse_count(item.statistics.comment_count),
                });
            }
        }
        Ok(videos)
    }

    async fn list_comments(&self, video_id: &str, max: usize) -> Result<Vec<Comment>> {
        let mut comments = Vec::new();
        let mut page_token: Option<String> = None;

        while comments.len() < max {
            let remaining = max - comments.len();
            let page_size = remaining.min(100).to_string();
            let mut query = vec![
                ("part", "snippet"),
                ("videoId", video_id),
                ("order", "relevance"),
                ("maxResults", page_size.as_str()),
                ("textFormat", "plainText"),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.as_str()));
            }
            let value = self.call("commentThreads", &query, 1).await?;
            let response: CommentThreadsResponse = parse_payload("commentThreads", value)?;

            for item in response.items {
                if comments.len() >= max {
                    break;
                }
                let snippet = item.snippet.top_level_comment.snippet;
                comments.push(Comment {
                    video_id: video_id.to_string(),
                    text: snippet.text_display,
                    like_count: snippet.like_count,
                    published_at: snippet.published_at,
                });
            }

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(comments)
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
///
/// 403 carries a reason: daily quota and rate limiting surface as
/// `QuotaExceeded`, disabled comments and other per-resource refusals as
/// `NotFound` so the item is skipped without killing the channel.
fn classify_http_error(resource: &str, status: u16, body: &str) -> Error {
    match status {
        403 => {
            let reason = error_reason(body).unwrap_or_default();
            if reason.to_lowercase().contains("quota") || reason == "dailyLimitExceeded" {
                Error::QuotaExceeded(format!("{}: {}", resource, reason))
            } else {
                Error::NotFound(format!("{} forbidden: {}", resource, reason))
            }
        }
        404 => Error::NotFound(format!("{}: 404", resource)),
        500..=599 => Error::Transient(format!("{}: server error {}", resource, status)),
        _ => Error::Transient(format!("{}: unexpected status {}", resource, status)),
    }
}

fn error_reason(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value["error"]["errors"][0]["reason"]
        .as_str()
        .map(String::from)
}

fn backoff_with_jitter(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE * 2u32.pow(attempt.saturating_sub(1));
    let capped = exp.min(BACKOFF_CAP);
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..500));
    (capped + jitter).min(BACKOFF_CAP)
}

fn parse_payload<T: serde::de::DeserializeOwned>(resource: &str, value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Parse(format!("{} payload: {}", resource, e)))
}

/// ISO-8601 durations as the platform writes them (`PT1H2M3S`, `P1DT2H`).
fn parse_iso8601_duration(s: &str) -> Option<u32> {
    let rest = s.strip_prefix('P')?;
    let mut seconds: u64 = 0;
    let mut number = String::new();
    let mut in_time = false;
    for ch in rest.chars() {
        match ch {
            'T' => in_time = true,
            '0'..='9' => number.push(ch),
            'D' if !in_time => {
                seconds += number.parse::<u64>().ok()? * 86_400;
                number.clear();
            }
            'H' if in_time => {
                seconds += number.parse::<u64>().ok()? * 3_600;
                number.clear();
            }
            'M' if in_time => {
                seconds += number.parse::<u64>().ok()? * 60;
                number.clear();
            }
            'S' if in_time => {
                seconds += number.parse::<u64>().ok()?;
                number.clear();
            }
            _ => return None,
        }
    }
    u32::try_from(seconds).ok()
}

fn parse_count(raw: Option<String>) -> u64 {
    raw.and_then(|s| s.parse().ok()).unwrap_or(0)
}

// ============================================================================
// Platform API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    #[serde(rename = "contentDetails")]
    content_details: ChannelContentDetails,
}

#[derive(Debug, Deserialize)]
struct ChannelContentDetails {
    #[serde(rename = "relatedPlaylists")]
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemsResponse {
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(default)]
    items: Vec<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    snippet: PlaylistItemSnippet,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemSnippet {
    #[serde(rename = "publishedAt")]
    published_at: DateTime<Utc>,
    #[serde(rename = "resourceId")]
    resource_id: ResourceId,
}

#[derive(Debug, Deserialize)]
struct ResourceId {
    #[serde(rename = "videoId")]
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    snippet: VideoSnippet,
    #[serde(rename = "contentDetails")]
    content_details: VideoContentDetails,
    #[serde(default)]
    statistics: VideoStatistics,
}

#[derive(Debug, Deserialize)]
struct VideoSnippet {
    #[serde(rename = "channelId")]
    channel_id: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "publishedAt")]
    published_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct VideoContentDetails {
    #[serde(default)]
    duration: String,
}

#[derive(Debug, Default, Deserialize)]
struct VideoStatistics {
    #[serde(rename = "viewCount")]
    view_count: Option<String>,
    #[serde(rename = "commentCount")]
    comment_count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentThreadsResponse {
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(default)]
    items: Vec<CommentThread>,
}

#[derive(Debug, Deserialize)]
struct CommentThread {
    snippet: CommentThreadSnippet,
}

#[derive(Debug, Deserialize)]
struct CommentThreadSnippet {
    #[serde(rename = "topLevelComment")]
    top_level_comment: TopLevelComment,
}

#[derive(Debug, Deserialize)]
struct TopLevelComment {
    snippet: CommentSnippet,
}

#[derive(Debug, Deserialize)]
struct CommentSnippet {
    #[serde(rename = "textDisplay")]
    text_display: String,
    #[serde(rename = "likeCount", default)]
    like_count: u64,
    #[serde(rename = "publishedAt")]
    published_at: DateTime<Utc>,
}

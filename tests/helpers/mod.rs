//! Shared test fixtures: an in-memory platform client and config builders
#![allow(dead_code)] // each test binary uses a different slice of this module

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use utalog::config::{AppConfig, ChannelConfig, GenreConfig, RunConfig};
use utalog::error::{Error, Result};
use utalog::models::{Comment, Video, VideoRef};
use utalog::services::PlatformApi;

pub const CHANNEL_1: &str = "UCHM_SLi7s0AJ8UBmm3pWN6Q";
pub const CHANNEL_2: &str = "UCmM2LkAA9WYFZor1k_szNew";
pub const CHANNEL_3: &str = "UCMf7-2iEzioOK6t_T7mVvDQ";

/// In-memory platform backend driving the orchestrator in tests.
///
/// Videos per channel are stored newest-first, matching the platform's
/// upload listing order. Once `quota_on_video_comments` trips, every
/// subsequent call answers `QuotaExceeded`, like a daily budget would.
#[derive(Default)]
pub struct FakePlatform {
    videos: HashMap<String, Vec<Video>>,
    comments: HashMap<String, Vec<Comment>>,
    quota_on_video_comments: Option<String>,
    quota_tripped: AtomicBool,
    pub list_uploads_calls: AtomicUsize,
    pub get_videos_calls: AtomicUsize,
    pub list_comments_calls: AtomicUsize,
}

impl FakePlatform {
    pub fn new() -> Self {
        FakePlatform::default()
    }

    pub fn add_video(&mut self, video: Video) {
        let channel = self.videos.entry(video.channel_id.clone()).or_default();
        channel.push(video);
        channel.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    }

    pub fn add_comment(&mut self, comment: Comment) {
        self.comments
            .entry(comment.video_id.clone())
            .or_default()
            .push(comment);
    }

    /// Exhaust the quota when comments for `video_id` are requested.
    pub fn trip_quota_on_comments(&mut self, video_id: &str) {
        self.quota_on_video_comments = Some(video_id.to_string());
    }

    fn check_quota(&self) -> Result<()> {
        if self.quota_tripped.load(Ordering::SeqCst) {
            return Err(Error::QuotaExceeded("daily quota exhausted".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn list_uploads(
        &self,
        channel_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<VideoRef>> {
        self.list_uploads_calls.fetch_add(1, Ordering::SeqCst);
        self.check_quota()?;
        let videos = self
            .videos
            .get(channel_id)
            .ok_or_else(|| Error::NotFound(format!("channel {}", channel_id)))?;
        Ok(videos
            .iter()
            .filter(|v| since.map_or(true, |since| v.published_at > since))
            .map(|v| VideoRef {
                id: v.id.clone(),
                published_at: v.published_at,
            })
            .collect())
    }

    async fn get_videos(&self, ids: &[String]) -> Result<Vec<Video>> {
        self.get_videos_calls.fetch_add(1, Ordering::SeqCst);
        self.check_quota()?;
        let mut out = Vec::new();
        for videos in self.videos.values() {
            for video in videos {
                if ids.contains(&video.id) {
                    out.push(video.clone());
                }
            }
        }
        Ok(out)
    }

    async fn list_comments(&self, video_id: &str, max: usize) -> Result<Vec<Comment>> {
        self.list_comments_calls.fetch_add(1, Ordering::SeqCst);
        self.check_quota()?;
        if self.quota_on_video_comments.as_deref() == Some(video_id) {
            self.quota_tripped.store(true, Ordering::SeqCst);
            return Err(Error::QuotaExceeded("daily quota exhausted".into()));
        }
        Ok(self
            .comments
            .get(video_id)
            .map(|c| c.iter().take(max).cloned().collect())
            .unwrap_or_default())
    }
}

pub fn channel(name: &str, channel_id: &str) -> ChannelConfig {
    ChannelConfig {
        name: name.to_string(),
        channel_id: channel_id.to_string(),
        enabled: true,
        thumbnail_url: None,
    }
}

pub fn video(id: &str, channel_id: &str, title: &str, description: &str, day: u32) -> Video {
    Video {
        id: id.to_string(),
        channel_id: channel_id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        published_at: Utc.with_ymd_and_hms(2024, 4, day, 12, 0, 0).unwrap(),
        duration_s: 5400,
        view_count: 1000,
        comment_count: 10,
    }
}

pub fn comment(video_id: &str, text: &str, like_count: u64) -> Comment {
    Comment {
        video_id: video_id.to_string(),
        text: text.to_string(),
        like_count,
        published_at: Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap(),
    }
}

pub fn genre_config() -> GenreConfig {
    serde_json::from_str(
        r#"{
            "categories": {
                "Vocaloid": {
                    "artists": ["初音ミク", "鏡音リン", "GUMI"],
                    "keywords": ["ボカロ", "vocaloid"]
                },
                "アニメ": {
                    "keywords": ["アニメ", "anime"],
                    "titles": ["残酷な天使のテーゼ"]
                },
                "J-POP": {
                    "keywords": ["j-pop", "jpop"]
                }
            },
            "artist_to_genre": {
                "YOASOBI": "J-POP",
                "King Gnu": "J-POP"
            }
        }"#,
    )
    .expect("test genre config")
}

pub fn app_config(channels: Vec<ChannelConfig>, max_parallel: usize) -> AppConfig {
    AppConfig {
        run: RunConfig {
            max_parallel_channels: max_parallel,
            ..RunConfig::default()
        },
        channels,
        genre: genre_config(),
    }
}

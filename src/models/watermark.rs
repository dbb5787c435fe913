//! Per-channel incremental-update watermarks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the most recent run that touched a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Ok,
    Partial,
    Failed,
}

/// The boundary between already-processed and new uploads for one channel.
///
/// `last_published_at` only ever moves forward; a failed or partial run
/// leaves it untouched so the next run re-covers the gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watermark {
    pub channel_id: String,
    pub last_run_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_published_at: Option<DateTime<Utc>>,
    pub status: ChannelStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Watermark {
    pub fn new(channel_id: &str, now: DateTime<Utc>) -> Self {
        Watermark {
            channel_id: channel_id.to_string(),
            last_run_at: now,
            last_video_id: None,
            last_published_at: None,
            status: ChannelStatus::Ok,
            last_error: None,
        }
    }

    /// Advance to a newly processed video, keeping the watermark monotone.
    pub fn advance(&mut self, video_id: &str, published_at: DateTime<Utc>, now: DateTime<Utc>) {
        if self.last_published_at.map_or(true, |prev| published_at >= prev) {
            self.last_published_at = Some(published_at);
            self.last_video_id = Some(video_id.to_string());
        }
        self.last_run_at = now;
        self.status = ChannelStatus::Ok;
        self.last_error = None;
    }

    /// Record a non-advancing outcome (quota halt, failure, cancellation).
    pub fn mark(&mut self, status: ChannelStatus, error: Option<String>, now: DateTime<Utc>) {
        self.last_run_at = now;
        self.status = status;
        self.last_error = error;
    }
}

//! Video and comment types as returned by the platform client

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lightweight reference from the uploads listing; full metadata follows
/// in a batched fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRef {
    pub id: String,
    pub published_at: DateTime<Utc>,
}

/// Full video metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub duration_s: u32,
    pub view_count: u64,
    pub comment_count: u64,
}

/// A top-level viewer comment.
///
/// Only the text and engagement signals survive extraction; author
/// identity is never materialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub video_id: String,
    pub text: String,
    pub like_count: u64,
    pub published_at: DateTime<Utc>,
}

/// Platform channel id shape: `UC` plus 22 id-safe characters.
pub fn is_valid_channel_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix("UC") else {
        return false;
    };
    rest.len() == 22
        && rest
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Platform video id shape: 11 id-safe characters.
pub fn is_valid_video_id(id: &str) -> bool {
    id.len() == 11
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_id_shape() {
        assert!(is_valid_channel_id("UCHM_SLi7s0AJ8UBmm3pWN6Q"));
        assert!(!is_valid_channel_id("HM_SLi7s0AJ8UBmm3pWN6Q"));
        assert!(!is_valid_channel_id("UCshort"));
        assert!(!is_valid_channel_id("UCHM_SLi7s0AJ8UBmm3pWN6Q7")); // 23 chars
        assert!(!is_valid_channel_id("UCHM SLi7s0AJ8UBmm3pWN6Q")); // space
    }

    #[test]
    fn test_video_id_shape() {
        assert!(is_valid_video_id("dQw4w9WgXcQ"));
        assert!(!is_valid_video_id("dQw4w9WgXc"));
        assert!(!is_valid_video_id("dQw4w9WgXcQ2"));
    }
}

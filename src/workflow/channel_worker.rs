//! Per-channel processing
//!
//! One worker owns one channel for the duration of a run. Videos inside a
//! channel are processed sequentially (newest first) so the watermark
//! advance stays well-defined; parallelism lives at the channel level.
//!
//! Containment rules: parse- and lookup-level failures never escape their
//! video, video-level `NotFound` never escapes the channel, and only a
//! fully completed channel hands rows to the merge stage.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::models::{CatalogRow, ChannelStatus, Origin, Video};
use crate::services::confidence_scorer::ConfidenceScorer;
use crate::services::genre_classifier::GenreClassifier;
use crate::services::setlist_selector::select;
use crate::services::timestamp_parser::parse_candidate;
use crate::services::youtube_client::PlatformApi;
use crate::store::GenreCache;

/// Work order for one channel.
#[derive(Debug, Clone)]
pub struct ChannelJob {
    pub channel: ChannelConfig,
    /// Strict lower bound on publish time; `None` means full history
    pub since: Option<DateTime<Utc>>,
    pub comments_per_video: usize,
}

/// What one channel worker produced.
#[derive(Debug)]
pub struct ChannelResult {
    pub channel_id: String,
    pub name: String,
    pub status: ChannelStatus,
    pub error: Option<String>,
    pub videos_processed: usize,
    /// Rows for the merge stage; empty unless the channel fully completed
    pub rows: Vec<CatalogRow>,
    /// Watermark advance `(video_id, published_at)` for a completed channel
    pub advance: Option<(String, DateTime<Utc>)>,
    /// Whether this channel tripped the shared quota halt
    pub quota_hit: bool,
}

impl ChannelResult {
    pub fn skipped(channel: &ChannelConfig, reason: &str) -> Self {
        ChannelResult {
            channel_id: channel.channel_id.clone(),
            name: channel.name.clone(),
            status: ChannelStatus::Partial,
            error: Some(reason.to_string()),
            videos_processed: 0,
            rows: Vec::new(),
            advance: None,
            quota_hit: false,
        }
    }

    fn halted(job: &ChannelJob, status: ChannelStatus, error: Error, processed: usize) -> Self {
        ChannelResult {
            channel_id: job.channel.channel_id.clone(),
            name: job.channel.name.clone(),
            status,
            quota_hit: error.is_quota(),
            error: Some(error.to_string()),
            videos_processed: processed,
            rows: Vec::new(),
            advance: None,
        }
    }
}

/// Drive one channel end to end: list new uploads, fetch metadata and
/// comments, extract, select, score, classify.
pub async fn process_channel<P: PlatformApi + ?Sized>(
    api: &P,
    job: &ChannelJob,
    scorer: &ConfidenceScorer,
    classifier: &GenreClassifier,
    cache: &Mutex<GenreCache>,
    cancel: &CancellationToken,
) -> ChannelResult {
    let channel_id = job.channel.channel_id.as_str();

    let refs = match api.list_uploads(channel_id, job.since).await {
        Ok(refs) => refs,
        Err(e) if e.is_quota() => {
            return ChannelResult::halted(job, ChannelStatus::Partial, e, 0);
        }
        Err(e) => {
            warn!(channel_id, error = %e, "upload listing failed");
            return ChannelResult::halted(job, ChannelStatus::Failed, e, 0);
        }
    };

    if refs.is_empty() {
        debug!(channel_id, "no new uploads");
        return ChannelResult {
            channel_id: channel_id.to_string(),
            name: job.channel.name.clone(),
            status: ChannelStatus::Ok,
            error: None,
            videos_processed: 0,
            rows: Vec::new(),
            advance: None,
            quota_hit: false,
        };
    }

    let ids: Vec<String> = refs.iter().map(|r| r.id.clone()).collect();
    let videos: HashMap<String, Video> = match api.get_videos(&ids).await {
        Ok(videos) => videos.into_iter().map(|v| (v.id.clone(), v)).collect(),
        Err(e) if e.is_quota() => {
            return ChannelResult::halted(job, ChannelStatus::Partial, e, 0);
        }
        Err(e) => {
            warn!(channel_id, error = %e, "metadata fetch failed");
            return ChannelResult::halted(job, ChannelStatus::Failed, e, 0);
        }
    };

    let mut rows = Vec::new();
    let mut processed = 0usize;

    for video_ref in &refs {
        if cancel.is_cancelled() {
            return ChannelResult::halted(
                job,
                ChannelStatus::Partial,
                Error::Transient("cancelled mid-channel".to_string()),
                processed,
            );
        }
        let Some(video) = videos.get(&video_ref.id) else {
            // listed but unfetchable (deleted or privated between calls)
            warn!(channel_id, video_id = %video_ref.id, "video vanished between listing and fetch");
            continue;
        };
        match process_video(api, video, job, scorer, classifier, cache).await {
            Ok(video_rows) => {
                rows.extend(video_rows);
                processed += 1;
            }
            Err(e) if e.is_quota() => {
                return ChannelResult::halted(job, ChannelStatus::Partial, e, processed);
            }
            Err(Error::NotFound(reason)) => {
                debug!(channel_id, video_id = %video.id, reason, "video skipped");
                processed += 1;
            }
            Err(e) => {
                warn!(channel_id, video_id = %video.id, error = %e, "video processing failed");
                return ChannelResult::halted(job, ChannelStatus::Failed, e, processed);
            }
        }
    }

    // refs are newest-first; the head is the new watermark
    let advance = refs.first().map(|r| (r.id.clone(), r.published_at));

    info!(
        channel_id,
        videos = processed,
        rows = rows.len(),
        "channel complete"
    );

    ChannelResult {
        channel_id: channel_id.to_string(),
        name: job.channel.name.clone(),
        status: ChannelStatus::Ok,
        error: None,
        videos_processed: processed,
        rows,
        advance,
        quota_hit: false,
    }
}

/// Extract, select, score, and classify one video.
async fn process_video<P: PlatformApi + ?Sized>(
    api: &P,
    video: &Video,
    job: &ChannelJob,
    scorer: &ConfidenceScorer,
    classifier: &GenreClassifier,
    cache: &Mutex<GenreCache>,
) -> Result<Vec<CatalogRow>> {
    let comments = match api.list_comments(&video.id, job.comments_per_video).await {
        Ok(comments) => comments,
        Err(Error::NotFound(reason)) => {
            debug!(video_id = %video.id, reason, "comments unavailable");
            Vec::new()
        }
        Err(e) => return Err(e),
    };

    let mut candidates = vec![parse_candidate(&video.description, Origin::Description)];
    for (index, comment) in comments.iter().enumerate() {
        candidates.push(parse_candidate(
            &comment.text,
            Origin::Comment {
                index,
                like_count: comment.like_count,
                published_at: comment.published_at,
            },
        ));
    }

    let selected = select(candidates);
    let confidence = scorer.score(video, selected.as_ref(), &comments);

    let Some(setlist) = selected else {
        // still scored for diagnostics, but nothing persists
        debug!(video_id = %video.id, confidence, "no usable setlist");
        return Ok(Vec::new());
    };

    info!(
        video_id = %video.id,
        origin = %setlist.origin.tag(),
        lines = setlist.len(),
        confidence,
        "setlist selected"
    );

    let mut rows = Vec::with_capacity(setlist.len());
    let mut cache = cache.lock().await;
    for line in &setlist.lines {
        let genre = classifier
            .classify(line.artist.as_deref().unwrap_or(""), &line.song, &mut cache)
            .await;
        rows.push(CatalogRow::from_line(video, line, genre, confidence));
    }
    Ok(rows)
}

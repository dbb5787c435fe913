//! Incremental update orchestrator
//!
//! Drives the whole run: watermark-bounded upload listing per channel,
//! bounded-parallel channel workers, the single merge into the canonical
//! catalog, and publishing. Channel state machine:
//! pending → running → (ok | partial | failed). A quota signal from any
//! worker halts every not-yet-started channel as `partial` without
//! further platform calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{AppConfig, StatePaths};
use crate::error::{Error, Result};
use crate::models::{ChannelStatus, Watermark};
use crate::services::confidence_scorer::ConfidenceScorer;
use crate::services::genre_classifier::GenreClassifier;
use crate::services::musicbrainz_client::MusicBrainzClient;
use crate::services::publisher::{publish, PublishStats};
use crate::services::youtube_client::PlatformApi;
use crate::store::catalog_store::MergeOutcome;
use crate::store::{Catalog, GenreCache, WatermarkStore};
use crate::workflow::channel_worker::{process_channel, ChannelJob, ChannelResult};

const PER_CHANNEL_TIMEOUT: Duration = Duration::from_secs(20 * 60);
const RUN_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);
const CATALOG_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// What kind of run to perform.
#[derive(Debug, Clone)]
pub enum RunMode {
    /// Incremental: each channel starts at its watermark
    Update,
    /// Ignore watermarks; optionally restricted to one channel
    Backfill(Option<String>),
}

/// Per-channel summary for the run report.
#[derive(Debug)]
pub struct ChannelOutcome {
    pub channel_id: String,
    pub name: String,
    pub status: ChannelStatus,
    pub videos_processed: usize,
    pub rows_emitted: usize,
    pub error: Option<String>,
}

/// Everything a run did, for diagnostics and the exit code.
#[derive(Debug)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<ChannelOutcome>,
    pub merged: MergeOutcome,
    pub deduped: usize,
    pub published: Option<PublishStats>,
    pub quota_hit: bool,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        if self.quota_hit {
            2
        } else {
            0
        }
    }
}

pub struct Orchestrator<P: PlatformApi + 'static> {
    api: Arc<P>,
    config: AppConfig,
    paths: StatePaths,
    cancel: CancellationToken,
}

impl<P: PlatformApi + 'static> Orchestrator<P> {
    pub fn new(api: Arc<P>, config: AppConfig, paths: StatePaths) -> Self {
        Orchestrator {
            api,
            config,
            paths,
            cancel: CancellationToken::new(),
        }
    }

    /// Token external callers (signal handlers) may cancel.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute a full run: channels → extraction → merge → publish.
    pub async fn run(&self, mode: RunMode) -> Result<RunReport> {
        let started_at = Utc::now();
        let mut watermarks = WatermarkStore::load(&self.paths.watermarks())?;

        let channels = self.select_channels(&mode)?;
        info!(
            channels = channels.len(),
            mode = ?mode,
            "starting run"
        );

        // the whole-run timeout behaves exactly like an external cancel
        let watchdog = {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(RUN_TIMEOUT).await;
                warn!("run timeout reached, cancelling");
                cancel.cancel();
            })
        };

        let classifier = Arc::new(self.build_classifier());
        let scorer = Arc::new(ConfidenceScorer::new());
        let cache = Arc::new(Mutex::new(GenreCache::load(&self.paths.genre_cache())?));

        let semaphore = Arc::new(Semaphore::new(self.config.run.max_parallel_channels));
        let quota_hit = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(channels.len());
        for channel in channels {
            let since = match &mode {
                RunMode::Update => watermarks
                    .get(&channel.channel_id)
                    .and_then(|wm| wm.last_published_at),
                RunMode::Backfill(_) => None,
            };
            let job = ChannelJob {
                channel,
                since,
                comments_per_video: self.config.run.comments_per_video,
            };
            let api = Arc::clone(&self.api);
            let scorer = Arc::clone(&scorer);
            let classifier = Arc::clone(&classifier);
            let cache = Arc::clone(&cache);
            let semaphore = Arc::clone(&semaphore);
            let quota_hit = Arc::clone(&quota_hit);
            let cancel = self.cancel.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("channel semaphore closed");
                if quota_hit.load(Ordering::SeqCst) {
                    return ChannelResult::skipped(&job.channel, "quota exhausted before start");
                }
                if cancel.is_cancelled() {
                    return ChannelResult::skipped(&job.channel, "cancelled before start");
                }
                let result = tokio::time::timeout(
                    PER_CHANNEL_TIMEOUT,
                    process_channel(
                        api.as_ref(),
                        &job,
                        &scorer,
                        &classifier,
                        &cache,
                        &cancel,
                    ),
                )
                .await;
                let result = match result {
                    Ok(result) => result,
                    Err(_) => ChannelResult::skipped(&job.channel, "channel timeout"),
                };
                if result.quota_hit {
                    quota_hit.store(true, Ordering::SeqCst);
                }
                result
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = handle
                .await
                .map_err(|e| Error::Transient(format!("channel task panicked: {}", e)))?;
            results.push(result);
        }
        watchdog.abort();

        // collect rows and stage watermark updates; nothing is committed
        // until the merge below succeeds
        let now = Utc::now();
        let mut all_new_rows = Vec::new();
        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            let mut watermark = watermarks
                .get(&result.channel_id)
                .cloned()
                .unwrap_or_else(|| Watermark::new(&result.channel_id, now));
            match result.status {
                ChannelStatus::Ok => match &result.advance {
                    Some((video_id, published_at)) => {
                        watermark.advance(video_id, *published_at, now)
                    }
                    None => watermark.mark(ChannelStatus::Ok, None, now),
                },
                status => watermark.mark(status, result.error.clone(), now),
            }
            watermarks.upsert(watermark);
            outcomes.push(ChannelOutcome {
                channel_id: result.channel_id,
                name: result.name,
                status: result.status,
                videos_processed: result.videos_processed,
                rows_emitted: result.rows.len(),
                error: result.error,
            });
            all_new_rows.extend(result.rows);
        }

        let (catalog, merged, deduped) = self.merge_into_catalog(all_new_rows).await?;

        // merge committed; now the watermark advances may commit too
        watermarks.save()?;
        cache.lock().await.save().await?;

        let enabled = self.config.enabled_channels();
        let published = publish(
            &catalog,
            &enabled,
            &self.paths.out_dir(),
            self.config.run.confidence_threshold,
            started_at,
        )?;

        let report = RunReport {
            started_at,
            outcomes,
            merged,
            deduped,
            published: Some(published),
            quota_hit: quota_hit.load(Ordering::SeqCst),
        };
        log_summary(&report, &catalog);
        Ok(report)
    }

    fn select_channels(&self, mode: &RunMode) -> Result<Vec<crate::config::ChannelConfig>> {
        let enabled = self.config.enabled_channels();
        match mode {
            RunMode::Backfill(Some(channel_id)) => {
                let channel = enabled
                    .iter()
                    .find(|c| c.channel_id == *channel_id)
                    .ok_or_else(|| {
                        Error::Config(format!("unknown or disabled channel: {}", channel_id))
                    })?;
                Ok(vec![(*channel).clone()])
            }
            _ => Ok(enabled.into_iter().cloned().collect()),
        }
    }

    fn build_classifier(&self) -> GenreClassifier {
        let classifier = GenreClassifier::new(self.config.genre.clone());
        if self.config.run.metadata_lookup {
            classifier.with_lookup(Arc::new(MusicBrainzClient::new()))
        } else {
            classifier
        }
    }

    /// Load, merge, dedupe, and save the canonical catalog under its lock.
    ///
    /// An integrity failure aborts before `save`, so the previous file
    /// survives untouched. The save itself is skipped when nothing
    /// changed.
    async fn merge_into_catalog(
        &self,
        new_rows: Vec<crate::models::CatalogRow>,
    ) -> Result<(Catalog, MergeOutcome, usize)> {
        let path = self.paths.catalog();
        let _lock =
            crate::store::atomic::FileLock::acquire(&path, CATALOG_LOCK_TIMEOUT).await?;
        let mut catalog = Catalog::load(&path)?;
        let merged = catalog.merge(new_rows)?;
        let deduped = catalog.dedupe_global();
        if merged.inserted + merged.updated > 0 || deduped > 0 {
            catalog.sort(crate::models::SortOrder::DateAsc);
            catalog.save(&path)?;
            info!(
                inserted = merged.inserted,
                updated = merged.updated,
                deduped,
                total = catalog.len(),
                "catalog saved"
            );
        }
        Ok((catalog, merged, deduped))
    }
}

/// Per-channel status plus catalog confidence bands, on stderr.
fn log_summary(report: &RunReport, catalog: &Catalog) {
    for outcome in &report.outcomes {
        match outcome.status {
            ChannelStatus::Ok => info!(
                channel = %outcome.name,
                channel_id = %outcome.channel_id,
                videos = outcome.videos_processed,
                rows = outcome.rows_emitted,
                "channel ok"
            ),
            ChannelStatus::Partial => warn!(
                channel = %outcome.name,
                channel_id = %outcome.channel_id,
                videos = outcome.videos_processed,
                error = outcome.error.as_deref().unwrap_or(""),
                "channel partial"
            ),
            ChannelStatus::Failed => error!(
                channel = %outcome.name,
                channel_id = %outcome.channel_id,
                error = outcome.error.as_deref().unwrap_or(""),
                "channel failed"
            ),
        }
    }

    let (mut high, mut mid, mut low) = (0usize, 0usize, 0usize);
    for row in catalog.rows() {
        if row.confidence > 0.7 {
            high += 1;
        } else if row.confidence >= 0.4 {
            mid += 1;
        } else {
            low += 1;
        }
    }
    info!(
        rows = catalog.len(),
        high_confidence = high,
        mid_confidence = mid,
        low_confidence = low,
        quota_hit = report.quota_hit,
        "run complete"
    );
}

//! Catalog maintenance entry points
//!
//! The non-harvesting CLI verbs: re-deriving the published JSONs and
//! re-running genre classification over the existing catalog. Neither
//! touches the platform API.

use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::config::{AppConfig, StatePaths};
use crate::error::Result;
use crate::services::genre_classifier::GenreClassifier;
use crate::services::publisher::{publish, PublishStats};
use crate::store::atomic::FileLock;
use crate::store::Catalog;

const CATALOG_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// `publish`: project the current catalog into the front-end JSONs.
pub fn publish_only(config: &AppConfig, paths: &StatePaths) -> Result<PublishStats> {
    let catalog = Catalog::load(&paths.catalog())?;
    let enabled = config.enabled_channels();
    publish(
        &catalog,
        &enabled,
        &paths.out_dir(),
        config.run.confidence_threshold,
        Utc::now(),
    )
}

/// `classify-recheck`: re-apply the deterministic genre rules to every
/// row and rewrite the catalog only if something changed.
///
/// Rows where no rule matches keep their current genre, so labels that
/// came from the external lookup survive a recheck with the lookup
/// disabled. An unchanged catalog is not rewritten.
pub async fn recheck_genres(config: &AppConfig, paths: &StatePaths) -> Result<usize> {
    let classifier = GenreClassifier::new(config.genre.clone());
    let path = paths.catalog();
    let _lock = FileLock::acquire(&path, CATALOG_LOCK_TIMEOUT).await?;

    let mut catalog = Catalog::load(&path)?;
    let changed = catalog.reclassify(|row| {
        classifier.classify_rules(row.artist_str(), &row.song)
    });

    if changed > 0 {
        catalog.save(&path)?;
    }
    info!(rows = catalog.len(), changed, "genre recheck complete");
    Ok(changed)
}

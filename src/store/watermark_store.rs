//! Watermark persistence
//!
//! One JSON file holds every channel's watermark. Each channel's entry is
//! owned by that channel's worker during a run; the whole file is
//! rewritten atomically when changes commit.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::Watermark;
use crate::store::atomic::write_atomic;

pub struct WatermarkStore {
    path: PathBuf,
    map: BTreeMap<String, Watermark>,
}

impl WatermarkStore {
    /// Load the watermark file; missing file means first run.
    pub fn load(path: &Path) -> Result<WatermarkStore> {
        let map = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| Error::Parse(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::Io(e)),
        };
        Ok(WatermarkStore {
            path: path.to_path_buf(),
            map,
        })
    }

    pub fn get(&self, channel_id: &str) -> Option<&Watermark> {
        self.map.get(channel_id)
    }

    pub fn upsert(&mut self, watermark: Watermark) {
        self.map.insert(watermark.channel_id.clone(), watermark);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Watermark> {
        self.map.values()
    }

    /// Rewrite the whole file atomically.
    pub fn save(&self) -> Result<()> {
        let body = serde_json::to_vec_pretty(&self.map)
            .map_err(|e| Error::Parse(format!("serializing watermarks: {}", e)))?;
        write_atomic(&self.path, &body)
    }
}

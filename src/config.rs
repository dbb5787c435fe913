//! Configuration loading and validation
//!
//! Three human-edited JSON files drive a run: the channel list, the genre
//! keyword config, and the run config. All are validated up front; any
//! defect is a fatal `Config` error before the first platform call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::video::is_valid_channel_id;

/// One curated channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub channel_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Channel files in the wild come either as a bare array or wrapped in a
/// `{"channels": [...]}` object; both are accepted.
#[derive(Deserialize)]
#[serde(untagged)]
enum ChannelFile {
    Bare(Vec<ChannelConfig>),
    Wrapped { channels: Vec<ChannelConfig> },
}

/// Run parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_quota_units")]
    pub daily_quota_units: u64,
    #[serde(default = "default_parallel")]
    pub max_parallel_channels: usize,
    #[serde(default = "default_comments")]
    pub comments_per_video: usize,
    #[serde(default = "default_threshold")]
    pub confidence_threshold: f64,
    /// Enable the external metadata tiebreaker in genre classification
    #[serde(default)]
    pub metadata_lookup: bool,
}

fn default_api_key_env() -> String {
    "UTALOG_API_KEY".to_string()
}
fn default_quota_units() -> u64 {
    10_000
}
fn default_parallel() -> usize {
    3
}
fn default_comments() -> usize {
    100
}
fn default_threshold() -> f64 {
    0.7
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            api_key_env: default_api_key_env(),
            daily_quota_units: default_quota_units(),
            max_parallel_channels: default_parallel(),
            comments_per_video: default_comments(),
            confidence_threshold: default_threshold(),
            metadata_lookup: false,
        }
    }
}

/// Genre rule configuration.
///
/// `categories` keeps file order; the classifier checks categories in
/// exactly that order, so the config author controls rule priority.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenreConfig {
    #[serde(default)]
    pub categories: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub artist_to_genre: HashMap<String, String>,
    #[serde(default)]
    pub song_to_genre: HashMap<String, String>,
    /// Maps external metadata tags to catalog genre labels
    #[serde(default)]
    pub genre_tag_map: HashMap<String, String>,
}

/// Everything a run needs, loaded and validated.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub run: RunConfig,
    pub channels: Vec<ChannelConfig>,
    pub genre: GenreConfig,
}

impl AppConfig {
    /// Load `config.json`, `channels.json`, and `genre_keywords.json` from
    /// a config directory. Missing run/genre configs fall back to
    /// defaults; a missing channel list is a hard error.
    pub fn load(config_dir: &Path) -> Result<AppConfig> {
        let run = match read_json_opt::<RunConfig>(&config_dir.join("config.json"))? {
            Some(run) => run,
            None => {
                info!("config.json not found, using defaults");
                RunConfig::default()
            }
        };

        let channels_path = config_dir.join("channels.json");
        let channel_file: ChannelFile = read_json_opt(&channels_path)?.ok_or_else(|| {
            Error::Config(format!("channel list not found: {}", channels_path.display()))
        })?;
        let channels = match channel_file {
            ChannelFile::Bare(list) => list,
            ChannelFile::Wrapped { channels } => channels,
        };

        let genre = read_json_opt::<GenreConfig>(&config_dir.join("genre_keywords.json"))?
            .unwrap_or_default();

        let config = AppConfig { run, channels, genre };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(Error::Config("channel list is empty".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for ch in &self.channels {
            if !is_valid_channel_id(&ch.channel_id) {
                return Err(Error::Config(format!(
                    "invalid channel id for '{}': {}",
                    ch.name, ch.channel_id
                )));
            }
            if !seen.insert(ch.channel_id.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate channel id: {}",
                    ch.channel_id
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.run.confidence_threshold) {
            return Err(Error::Config(format!(
                "confidence_threshold out of range: {}",
                self.run.confidence_threshold
            )));
        }
        if self.run.max_parallel_channels == 0 {
            return Err(Error::Config(
                "max_parallel_channels must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Channels eligible for this run, in config order.
    pub fn enabled_channels(&self) -> Vec<&ChannelConfig> {
        self.channels.iter().filter(|c| c.enabled).collect()
    }
}

fn read_json_opt<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
}

/// Resolve the platform API key from the environment variable named in
/// run config.
pub fn resolve_api_key(run: &RunConfig) -> Result<String> {
    match std::env::var(&run.api_key_env) {
        Ok(key) if is_valid_key(&key) => {
            info!("API key loaded from {}", run.api_key_env);
            Ok(key)
        }
        _ => Err(Error::Config(format!(
            "API key not configured; set the {} environment variable",
            run.api_key_env
        ))),
    }
}

/// Validate an API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Locations of the persisted state files for one deployment.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub state_dir: PathBuf,
}

impl StatePaths {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        StatePaths {
            state_dir: state_dir.into(),
        }
    }

    pub fn watermarks(&self) -> PathBuf {
        self.state_dir.join("watermarks.json")
    }

    pub fn catalog(&self) -> PathBuf {
        self.state_dir.join("catalog.csv")
    }

    pub fn genre_cache(&self) -> PathBuf {
        self.state_dir.join("genre_cache.json")
    }

    pub fn out_dir(&self) -> PathBuf {
        self.state_dir.join("out")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str) -> ChannelConfig {
        ChannelConfig {
            name: "test".into(),
            channel_id: id.into(),
            enabled: true,
            thumbnail_url: None,
        }
    }

    #[test]
    fn test_validate_rejects_bad_channel_id() {
        let config = AppConfig {
            run: RunConfig::default(),
            channels: vec![channel("not-a-channel")],
            genre: GenreConfig::default(),
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_channels() {
        let config = AppConfig {
            run: RunConfig::default(),
            channels: vec![
                channel("UCHM_SLi7s0AJ8UBmm3pWN6Q"),
                channel("UCHM_SLi7s0AJ8UBmm3pWN6Q"),
            ],
            genre: GenreConfig::default(),
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_channel_file_accepts_both_shapes() {
        let bare: ChannelFile = serde_json::from_str(
            r#"[{"name":"a","channel_id":"UCHM_SLi7s0AJ8UBmm3pWN6Q"}]"#,
        )
        .unwrap();
        let wrapped: ChannelFile = serde_json::from_str(
            r#"{"channels":[{"name":"a","channel_id":"UCHM_SLi7s0AJ8UBmm3pWN6Q","enabled":false}]}"#,
        )
        .unwrap();
        match bare {
            ChannelFile::Bare(list) => assert!(list[0].enabled),
            _ => panic!("expected bare list"),
        }
        match wrapped {
            ChannelFile::Wrapped { channels } => assert!(!channels[0].enabled),
            _ => panic!("expected wrapped list"),
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_resolve_api_key_from_env() {
        let run = RunConfig {
            api_key_env: "UTALOG_TEST_API_KEY".into(),
            ..RunConfig::default()
        };
        std::env::remove_var("UTALOG_TEST_API_KEY");
        assert!(matches!(resolve_api_key(&run), Err(Error::Config(_))));

        std::env::set_var("UTALOG_TEST_API_KEY", "   ");
        assert!(matches!(resolve_api_key(&run), Err(Error::Config(_))));

        std::env::set_var("UTALOG_TEST_API_KEY", "key-value");
        assert_eq!(resolve_api_key(&run).unwrap(), "key-value");

        std::env::remove_var("UTALOG_TEST_API_KEY");
    }

    #[test]
    fn test_run_config_defaults() {
        let run: RunConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(run.max_parallel_channels, 3);
        assert_eq!(run.comments_per_video, 100);
        assert!((run.confidence_threshold - 0.7).abs() < f64::EPSILON);
        assert!(!run.metadata_lookup);
    }
}

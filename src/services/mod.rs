//! Pipeline services: platform client, extraction, scoring,
//! classification, publishing

pub mod confidence_scorer;
pub mod genre_classifier;
pub mod musicbrainz_client;
pub mod publisher;
pub mod setlist_selector;
pub mod timestamp_parser;
pub mod youtube_client;

pub use confidence_scorer::ConfidenceScorer;
pub use genre_classifier::GenreClassifier;
pub use musicbrainz_client::MusicBrainzClient;
pub use setlist_selector::select;
pub use timestamp_parser::parse_candidate;
pub use youtube_client::{PlatformApi, YouTubeClient};

//! Domain types
//!
//! Channels come from config; videos, comments, and candidate setlists are
//! transient per run; catalog rows and watermarks are the persisted state.

pub mod catalog;
pub mod setlist;
pub mod video;
pub mod watermark;

pub use catalog::{CatalogRow, SortOrder};
pub use setlist::{CandidateSetlist, Origin, TimestampLine};
pub use video::{Comment, Video, VideoRef};
pub use watermark::{ChannelStatus, Watermark};

//! Persisted state: catalog, watermarks, genre cache

pub mod atomic;
pub mod catalog_store;
pub mod genre_cache;
pub mod watermark_store;

pub use catalog_store::{Catalog, MergeOutcome, CATALOG_HEADER};
pub use genre_cache::GenreCache;
pub use watermark_store::WatermarkStore;

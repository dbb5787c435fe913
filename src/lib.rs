//! # utalog
//!
//! Harvests video descriptions and viewer comments from a curated set of
//! channels, extracts time-coded setlists, scores each video's likelihood
//! of being a singing stream, classifies songs by genre, and maintains a
//! canonical catalog plus the JSON artifacts the static front-end reads.
//!
//! Pipeline: orchestrator → platform client → timestamp parser → setlist
//! selector → confidence scorer → genre classifier → catalog store →
//! publisher.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod util;
pub mod workflow;

pub use crate::error::{Error, Result};

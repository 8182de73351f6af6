//! Road network segmentation and resampling.
//!
//! Ways of an OpenStreetMap extract are split at their crossings into branch-free
//! segments, and each segment is resampled into points evenly spaced along it.

pub mod config;
pub mod data;
pub mod errors;
pub mod etl;
pub mod resampling;
pub mod topology;

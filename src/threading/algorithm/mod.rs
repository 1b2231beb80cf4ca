//! Email threading algorithm implementation
//!
//! This module implements the JWZ (Jamie Zawinski) threading algorithm
//! for organizing email messages into conversation threads.
//!
//! ## Main Entry Point
//!
//! Use `build_threads()` to thread a collection of messages, then
//! `ThreadForest::into_flattened()` for the display listing.

mod cycle_detection;
mod jwz_threading;
mod tree_traversal;

pub use cycle_detection::would_create_cycle;
pub use jwz_threading::{build_threads, build_threads_with, ThreadForest, ThreadOptions};
pub use tree_traversal::{flatten_forest, sort_by_date, FlatEntry};

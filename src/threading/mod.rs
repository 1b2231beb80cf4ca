//! Email threading module
//!
//! This module implements the JWZ (Jamie Zawinski) threading algorithm for organizing
//! email messages into conversation threads. The implementation is based on the algorithm
//! from https://www.jwz.org/doc/threading.html.
//!
//! ## Threading Strategy
//!
//! 1. **References**: the merged `References` + `In-Reply-To` ids of each message
//!    build parent-child links, with dummies standing in for unseen messages
//! 2. **Subject grouping**: roots sharing a normalized subject are folded together
//!    when headers were lost along the way
//!
//! ## Module Structure
//!
//! - `container`: Arena of containers for one threading run
//! - `algorithm`: Core JWZ threading implementation, ordering and flattening
//! - `subject_matching`: Subject normalization and the subject-based merge

pub mod algorithm;
pub mod container;
pub mod subject_matching;

pub use algorithm::{build_threads, build_threads_with, ThreadForest, ThreadOptions};
pub use container::{Container, ContainerArena, ContainerId};
pub use subject_matching::{display_subject, is_reply, is_starter_candidate, normalize_subject};

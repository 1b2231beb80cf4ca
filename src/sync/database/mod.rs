//! Embedded message store.
//!
//! This module provides the SQLite-backed persistence of the indexer:
//! - Schema migrations and connection setup
//! - Indexed message records and the derived resume point
//! - The single-writer lease

pub mod lease;
pub mod migration;
pub mod store;

// Re-export commonly used items
pub use lease::{acquire_lease, current_holder, heartbeat_lease, release_lease};
pub use migration::{connect, run_migrations};
pub use store::MessageStore;

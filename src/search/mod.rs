//! Thread lookup and search over the message store.

pub mod service;
pub mod types;

pub use service::ThreadService;
pub use types::{SEARCH_PAGE_SIZE, ThreadSummary};

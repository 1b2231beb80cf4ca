use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of threads returned by one search.
pub const SEARCH_PAGE_SIZE: i64 = 100;

/// One thread in a search listing, described by its representative message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub message_id: String,
    pub subject: String,
    pub from_name: String,
    pub from_addr: String,
    /// `Name <addr>`, or the bare address when the name is empty.
    pub from: String,
    pub date: DateTime<Utc>,
    /// Records in the whole thread, not only those matching the query.
    pub message_count: i64,
}

/// Display form of a sender.
pub fn format_sender(name: &str, addr: &str) -> String {
    if name.is_empty() {
        addr.to_string()
    } else {
        format!("{} <{}>", name, addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sender() {
        assert_eq!(format_sender("Jane", "jane@example.com"), "Jane <jane@example.com>");
        assert_eq!(format_sender("", "jane@example.com"), "jane@example.com");
    }
}

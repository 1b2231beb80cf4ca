use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::threading::subject_matching::is_starter_candidate;

// ===== Decoded Messages =====

/// A mailing-list message decoded from an archive blob.
///
/// `references` holds the merged `References` + `In-Reply-To` ids in header
/// order, without angle brackets and without duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub subject: String,
    pub references: Vec<String>,
    pub from_name: String,
    pub from_addr: String,
    pub date: DateTime<Utc>,
    pub body: String,
}

// ===== Persisted Records =====

/// One row of the message store.
///
/// `content_ref` is the archive commit the message was read from and never
/// changes for a given commit; `root_message_id` is the single-hop root
/// computed at index time and may be overwritten when a commit is reprocessed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedMessage {
    pub message_id: String,
    pub subject: String,
    pub from_addr: String,
    pub from_name: String,
    pub date_sent: DateTime<Utc>,
    pub content_ref: String,
    pub root_message_id: String,
    /// Whether the subject may represent its thread in search listings.
    pub starter_eligible: bool,
}

impl IndexedMessage {
    pub fn from_message(
        message: &Message,
        content_ref: impl Into<String>,
        root_message_id: impl Into<String>,
    ) -> Self {
        IndexedMessage {
            message_id: message.message_id.clone(),
            subject: message.subject.clone(),
            from_addr: message.from_addr.clone(),
            from_name: message.from_name.clone(),
            date_sent: message.date,
            content_ref: content_ref.into(),
            root_message_id: root_message_id.into(),
            starter_eligible: is_starter_candidate(&message.subject),
        }
    }
}

// ===== Thread Views =====

/// A message positioned in a flattened thread listing.
///
/// `display_subject` is empty when the subject merely repeats the parent's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadedMessage {
    #[serde(flatten)]
    pub message: Message,
    pub depth: usize,
    pub display_subject: String,
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::System => "system",
        }
    }
}

/// One delivery or read entry: which user, and when.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub user_id: String,
    pub at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub emoji: String,
    pub user_id: String,
}

/// A sent message. Content is immutable after creation; the only permitted
/// mutations append delivery/read entries and reactions.
///
/// Invariant: every user in `read_by` also appears in `delivered_to`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    /// Chat participants minus the sender, snapshotted at send time.
    pub recipient_ids: Vec<String>,
    pub content: Option<String>,
    pub attachment_ids: Vec<String>,
    pub kind: MessageKind,
    pub reply_to: Option<String>,
    pub timestamp: i64,
    pub delivered_to: Vec<Receipt>,
    pub read_by: Vec<Receipt>,
    /// Legacy scalars mirroring "read by anyone".
    pub read: bool,
    pub read_at: Option<i64>,
    pub reactions: Vec<Reaction>,
}

impl Message {
    pub fn delivered_for(&self, user_id: &str) -> bool {
        self.delivered_to.iter().any(|r| r.user_id == user_id)
    }

    pub fn read_for(&self, user_id: &str) -> bool {
        self.read_by.iter().any(|r| r.user_id == user_id)
    }
}

/// Role filter for per-user message queries.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Sender,
    Recipient,
}

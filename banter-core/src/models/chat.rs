use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::user::User;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Direct,
    Group,
}

/// A conversation record with its denormalized preview fields.
///
/// `unread_count` is keyed by participant id and mutated through the store's
/// atomic per-key increment; the starred/pinned/muted/archived flags are
/// global to the chat, not per participant.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Chat {
    pub id: String,
    pub kind: ChatKind,
    pub name: Option<String>,
    /// Unique participant ids, order irrelevant (stored sorted).
    pub participants: Vec<String>,
    pub last_message_id: Option<String>,
    pub last_message_preview: Option<String>,
    pub last_messaged_at: Option<i64>,
    pub unread_count: HashMap<String, u64>,
    pub starred: bool,
    pub pinned: bool,
    pub muted: bool,
    pub archived: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Chat {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}

/// A chat enriched with resolved participant records, returned to callers
/// and broadcast on `chatUpdated`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatView {
    #[serde(flatten)]
    pub chat: Chat,
    pub participant_details: Vec<User>,
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Message,
    System,
}

/// A user-facing notification. Soft-deleted via `is_deleted`; listing and
/// counting queries only ever see live records.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub related_user_id: Option<String>,
    pub related_message_id: Option<String>,
    pub related_chat_id: Option<String>,
    pub is_read: bool,
    pub is_deleted: bool,
    pub read_at: Option<i64>,
    pub created_at: i64,
}

/// Per-(user, chat) mute marker. Its existence means "this chat is muted for
/// this user"; it never appears in notification listings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMute {
    pub user_id: String,
    pub chat_id: String,
    pub created_at: i64,
}

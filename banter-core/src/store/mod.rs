use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::models::input::UpdateChatInput;
use crate::models::{Attachment, Chat, ChatMute, Message, MessageRole, Notification, User};

mod memory;

pub use memory::MemoryStore;

/// Tenant-scoped document store behind the services.
///
/// Implementations must make the targeted mutators (`bump_unread`, the
/// receipt appends, the attachment transitions) atomic per document; services
/// never read-modify-write those fields themselves. Whole-document writes are
/// reserved for inserts.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // --- users ---

    async fn insert_user(&self, user: User) -> Result<()>;

    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    // --- chats ---

    async fn insert_chat(&self, chat: Chat) -> Result<()>;

    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>>;

    async fn delete_chat(&self, chat_id: &str) -> Result<()>;

    /// Finds the non-deleted direct chat holding exactly this unordered pair.
    async fn find_direct_chat(&self, user_a: &str, user_b: &str) -> Result<Option<Chat>>;

    async fn all_chats(&self) -> Result<Vec<Chat>>;

    async fn chats_for_user(&self, user_id: &str) -> Result<Vec<Chat>>;

    /// Atomically adds `delta` to `unread_count[user_id]`, clamping at zero.
    /// Missing keys are created on a positive delta.
    async fn bump_unread(&self, chat_id: &str, user_id: &str, delta: i64) -> Result<()>;

    async fn reset_unread(&self, chat_id: &str, user_id: &str) -> Result<()>;

    /// Updates the denormalized preview fields and `updated_at` in one write.
    async fn set_chat_preview(
        &self,
        chat_id: &str,
        last_message_id: Option<String>,
        last_message_preview: Option<String>,
        last_messaged_at: Option<i64>,
    ) -> Result<()>;

    /// Applies the whitelisted settings fields, refreshes `updated_at`, and
    /// returns the updated chat. `Ok(None)` when the chat does not exist.
    async fn apply_chat_settings(
        &self,
        chat_id: &str,
        patch: &UpdateChatInput,
    ) -> Result<Option<Chat>>;

    // --- messages ---

    async fn insert_message(&self, message: Message) -> Result<()>;

    async fn get_message(&self, message_id: &str) -> Result<Option<Message>>;

    async fn delete_message(&self, message_id: &str) -> Result<()>;

    /// Deletes every message of the chat, returning how many went away.
    async fn delete_chat_messages(&self, chat_id: &str) -> Result<u64>;

    /// Window of messages for a chat in ascending timestamp order: the newest
    /// `limit` messages strictly older than `before` when a cursor is given.
    async fn messages_for_chat(
        &self,
        chat_id: &str,
        limit: usize,
        before: Option<i64>,
    ) -> Result<Vec<Message>>;

    async fn messages_by_user(&self, user_id: &str, role: MessageRole) -> Result<Vec<Message>>;

    /// Messages of the chat not authored by `user_id` and not yet read by
    /// them, ascending by timestamp.
    async fn unread_messages_for(&self, chat_id: &str, user_id: &str) -> Result<Vec<Message>>;

    /// Appends a delivery receipt unless the user already has a delivery or
    /// read entry. Returns whether anything changed; a vanished message is a
    /// no-op.
    async fn append_delivery(&self, message_id: &str, user_id: &str, at: i64) -> Result<bool>;

    /// Appends a read receipt unless one exists, synthesizing the delivery
    /// entry at the same timestamp when absent, and sets the legacy
    /// `read`/`read_at` scalars on the first read by anyone. Returns whether
    /// anything changed.
    async fn append_read(&self, message_id: &str, user_id: &str, at: i64) -> Result<bool>;

    /// Adds a reaction entry; duplicate (emoji, user) pairs are a no-op.
    async fn add_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<bool>;

    async fn remove_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<bool>;

    // --- attachments ---

    async fn insert_attachment(&self, attachment: Attachment) -> Result<()>;

    async fn get_attachment(&self, attachment_id: &str) -> Result<Option<Attachment>>;

    async fn delete_attachment(&self, attachment_id: &str) -> Result<()>;

    async fn attachments_for_chat(&self, chat_id: &str) -> Result<Vec<Attachment>>;

    async fn attachments_for_message(&self, message_id: &str) -> Result<Vec<Attachment>>;

    /// Binds an attachment to the message that carries it.
    async fn bind_attachment_message(&self, attachment_id: &str, message_id: &str) -> Result<()>;

    /// Transitions Uploading -> Ready/Clean with the durable url, merged
    /// metadata and a refreshed `uploaded_at`. Returns false when the record
    /// is missing or already terminal; terminal states never revert.
    async fn complete_attachment(
        &self,
        attachment_id: &str,
        url: String,
        metadata: Map<String, Value>,
    ) -> Result<bool>;

    /// Transitions Uploading -> Error, recording the error in metadata.
    /// Returns false when the record is missing or already terminal.
    async fn mark_attachment_error(&self, attachment_id: &str, error: String) -> Result<bool>;

    /// Records still Uploading whose `uploaded_at` is older than `cutoff`.
    async fn stalled_uploads(&self, cutoff: i64) -> Result<Vec<Attachment>>;

    // --- notifications ---

    async fn insert_notification(&self, notification: Notification) -> Result<()>;

    async fn get_notification(&self, notification_id: &str) -> Result<Option<Notification>>;

    /// Non-deleted notifications for the user, newest first.
    async fn notifications_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Notification>>;

    async fn unread_notification_count(&self, user_id: &str) -> Result<u64>;

    async fn mark_notification_read(&self, notification_id: &str, at: i64) -> Result<bool>;

    async fn mark_all_notifications_read(&self, user_id: &str, at: i64) -> Result<u64>;

    async fn soft_delete_notification(&self, notification_id: &str) -> Result<bool>;

    async fn clear_notifications(&self, user_id: &str) -> Result<u64>;

    // --- chat mutes ---

    async fn is_muted(&self, user_id: &str, chat_id: &str) -> Result<bool>;

    async fn insert_mute(&self, mute: ChatMute) -> Result<()>;

    async fn remove_mute(&self, user_id: &str, chat_id: &str) -> Result<()>;
}

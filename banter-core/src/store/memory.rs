use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::input::UpdateChatInput;
use crate::models::{
    Attachment, AttachmentStatus, Chat, ChatKind, ChatMute, Message, MessageRole, Notification,
    Receipt, User, VirusScanStatus,
};

use super::DocumentStore;

/// In-memory document store on concurrent maps. Per-document mutators hold
/// the entry lock for the whole mutation, which gives the atomicity the
/// trait requires.
pub struct MemoryStore {
    users: DashMap<String, User>,
    chats: DashMap<String, Chat>,
    messages: DashMap<String, Message>,
    attachments: DashMap<String, Attachment>,
    notifications: DashMap<String, Notification>,
    mutes: DashMap<(String, String), ChatMute>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            chats: DashMap::new(),
            messages: DashMap::new(),
            attachments: DashMap::new(),
            notifications: DashMap::new(),
            mutes: DashMap::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_pair(a: &str, b: &str) -> [String; 2] {
    let mut pair = [a.to_string(), b.to_string()];
    pair.sort();
    pair
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_user(&self, user: User) -> Result<()> {
        self.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn insert_chat(&self, chat: Chat) -> Result<()> {
        self.chats.insert(chat.id.clone(), chat);
        Ok(())
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        Ok(self.chats.get(chat_id).map(|c| c.clone()))
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        self.chats.remove(chat_id);
        Ok(())
    }

    async fn find_direct_chat(&self, user_a: &str, user_b: &str) -> Result<Option<Chat>> {
        let pair = sorted_pair(user_a, user_b);
        Ok(self
            .chats
            .iter()
            .find(|c| c.kind == ChatKind::Direct && c.participants == pair)
            .map(|c| c.clone()))
    }

    async fn all_chats(&self) -> Result<Vec<Chat>> {
        Ok(self.chats.iter().map(|c| c.clone()).collect())
    }

    async fn chats_for_user(&self, user_id: &str) -> Result<Vec<Chat>> {
        Ok(self
            .chats
            .iter()
            .filter(|c| c.is_participant(user_id))
            .map(|c| c.clone())
            .collect())
    }

    async fn bump_unread(&self, chat_id: &str, user_id: &str, delta: i64) -> Result<()> {
        if let Some(mut chat) = self.chats.get_mut(chat_id) {
            let counter = chat.unread_count.entry(user_id.to_string()).or_insert(0);
            *counter = (*counter as i64).saturating_add(delta).max(0) as u64;
        }
        Ok(())
    }

    async fn reset_unread(&self, chat_id: &str, user_id: &str) -> Result<()> {
        if let Some(mut chat) = self.chats.get_mut(chat_id) {
            chat.unread_count.insert(user_id.to_string(), 0);
        }
        Ok(())
    }

    async fn set_chat_preview(
        &self,
        chat_id: &str,
        last_message_id: Option<String>,
        last_message_preview: Option<String>,
        last_messaged_at: Option<i64>,
    ) -> Result<()> {
        if let Some(mut chat) = self.chats.get_mut(chat_id) {
            chat.last_message_id = last_message_id;
            chat.last_message_preview = last_message_preview;
            chat.last_messaged_at = last_messaged_at;
            chat.updated_at = Utc::now().timestamp_millis();
        }
        Ok(())
    }

    async fn apply_chat_settings(
        &self,
        chat_id: &str,
        patch: &UpdateChatInput,
    ) -> Result<Option<Chat>> {
        let Some(mut chat) = self.chats.get_mut(chat_id) else {
            return Ok(None);
        };
        if let Some(name) = &patch.name {
            chat.name = Some(name.clone());
        }
        if let Some(starred) = patch.starred {
            chat.starred = starred;
        }
        if let Some(pinned) = patch.pinned {
            chat.pinned = pinned;
        }
        if let Some(muted) = patch.muted {
            chat.muted = muted;
        }
        if let Some(archived) = patch.archived {
            chat.archived = archived;
        }
        chat.updated_at = Utc::now().timestamp_millis();
        Ok(Some(chat.clone()))
    }

    async fn insert_message(&self, message: Message) -> Result<()> {
        self.messages.insert(message.id.clone(), message);
        Ok(())
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<Message>> {
        Ok(self.messages.get(message_id).map(|m| m.clone()))
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        self.messages.remove(message_id);
        Ok(())
    }

    async fn delete_chat_messages(&self, chat_id: &str) -> Result<u64> {
        let ids: Vec<String> = self
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .map(|m| m.id.clone())
            .collect();
        let mut removed = 0;
        for id in ids {
            if self.messages.remove(&id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn messages_for_chat(
        &self,
        chat_id: &str,
        limit: usize,
        before: Option<i64>,
    ) -> Result<Vec<Message>> {
        let mut page: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .filter(|m| before.map_or(true, |cursor| m.timestamp < cursor))
            .map(|m| m.clone())
            .collect();
        // Newest `limit` of the window, returned in ascending order.
        page.sort_by(|a, b| (b.timestamp, &b.id).cmp(&(a.timestamp, &a.id)));
        page.truncate(limit);
        page.reverse();
        Ok(page)
    }

    async fn messages_by_user(&self, user_id: &str, role: MessageRole) -> Result<Vec<Message>> {
        let mut found: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| match role {
                MessageRole::Sender => m.sender_id == user_id,
                MessageRole::Recipient => m.recipient_ids.iter().any(|r| r == user_id),
            })
            .map(|m| m.clone())
            .collect();
        found.sort_by_key(|m| m.timestamp);
        Ok(found)
    }

    async fn unread_messages_for(&self, chat_id: &str, user_id: &str) -> Result<Vec<Message>> {
        let mut found: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id && m.sender_id != user_id && !m.read_for(user_id))
            .map(|m| m.clone())
            .collect();
        found.sort_by_key(|m| m.timestamp);
        Ok(found)
    }

    async fn append_delivery(&self, message_id: &str, user_id: &str, at: i64) -> Result<bool> {
        let Some(mut message) = self.messages.get_mut(message_id) else {
            return Ok(false);
        };
        if message.delivered_for(user_id) || message.read_for(user_id) {
            return Ok(false);
        }
        message.delivered_to.push(Receipt {
            user_id: user_id.to_string(),
            at,
        });
        Ok(true)
    }

    async fn append_read(&self, message_id: &str, user_id: &str, at: i64) -> Result<bool> {
        let Some(mut message) = self.messages.get_mut(message_id) else {
            return Ok(false);
        };
        if message.read_for(user_id) {
            return Ok(false);
        }
        // Read implies delivered.
        if !message.delivered_for(user_id) {
            message.delivered_to.push(Receipt {
                user_id: user_id.to_string(),
                at,
            });
        }
        message.read_by.push(Receipt {
            user_id: user_id.to_string(),
            at,
        });
        if !message.read {
            message.read = true;
            message.read_at = Some(at);
        }
        Ok(true)
    }

    async fn add_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<bool> {
        let Some(mut message) = self.messages.get_mut(message_id) else {
            return Ok(false);
        };
        if message
            .reactions
            .iter()
            .any(|r| r.emoji == emoji && r.user_id == user_id)
        {
            return Ok(false);
        }
        message.reactions.push(crate::models::Reaction {
            emoji: emoji.to_string(),
            user_id: user_id.to_string(),
        });
        Ok(true)
    }

    async fn remove_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<bool> {
        let Some(mut message) = self.messages.get_mut(message_id) else {
            return Ok(false);
        };
        let before = message.reactions.len();
        message
            .reactions
            .retain(|r| !(r.emoji == emoji && r.user_id == user_id));
        Ok(message.reactions.len() != before)
    }

    async fn insert_attachment(&self, attachment: Attachment) -> Result<()> {
        self.attachments.insert(attachment.id.clone(), attachment);
        Ok(())
    }

    async fn get_attachment(&self, attachment_id: &str) -> Result<Option<Attachment>> {
        Ok(self.attachments.get(attachment_id).map(|a| a.clone()))
    }

    async fn delete_attachment(&self, attachment_id: &str) -> Result<()> {
        self.attachments.remove(attachment_id);
        Ok(())
    }

    async fn attachments_for_chat(&self, chat_id: &str) -> Result<Vec<Attachment>> {
        let mut found: Vec<Attachment> = self
            .attachments
            .iter()
            .filter(|a| a.chat_id == chat_id)
            .map(|a| a.clone())
            .collect();
        found.sort_by_key(|a| a.uploaded_at);
        Ok(found)
    }

    async fn attachments_for_message(&self, message_id: &str) -> Result<Vec<Attachment>> {
        let mut found: Vec<Attachment> = self
            .attachments
            .iter()
            .filter(|a| a.message_id.as_deref() == Some(message_id))
            .map(|a| a.clone())
            .collect();
        found.sort_by_key(|a| a.uploaded_at);
        Ok(found)
    }

    async fn bind_attachment_message(&self, attachment_id: &str, message_id: &str) -> Result<()> {
        if let Some(mut attachment) = self.attachments.get_mut(attachment_id) {
            attachment.message_id = Some(message_id.to_string());
        }
        Ok(())
    }

    async fn complete_attachment(
        &self,
        attachment_id: &str,
        url: String,
        metadata: Map<String, Value>,
    ) -> Result<bool> {
        let Some(mut attachment) = self.attachments.get_mut(attachment_id) else {
            return Ok(false);
        };
        if attachment.status != AttachmentStatus::Uploading {
            return Ok(false);
        }
        attachment.url = Some(url);
        attachment.status = AttachmentStatus::Ready;
        attachment.virus_scan = VirusScanStatus::Clean;
        attachment.uploaded_at = Utc::now().timestamp_millis();
        attachment.metadata.extend(metadata);
        Ok(true)
    }

    async fn mark_attachment_error(&self, attachment_id: &str, error: String) -> Result<bool> {
        let Some(mut attachment) = self.attachments.get_mut(attachment_id) else {
            return Ok(false);
        };
        if attachment.status != AttachmentStatus::Uploading {
            return Ok(false);
        }
        attachment.status = AttachmentStatus::Error;
        attachment
            .metadata
            .insert("error".to_string(), Value::String(error));
        Ok(true)
    }

    async fn stalled_uploads(&self, cutoff: i64) -> Result<Vec<Attachment>> {
        Ok(self
            .attachments
            .iter()
            .filter(|a| a.status == AttachmentStatus::Uploading && a.uploaded_at < cutoff)
            .map(|a| a.clone())
            .collect())
    }

    async fn insert_notification(&self, notification: Notification) -> Result<()> {
        self.notifications
            .insert(notification.id.clone(), notification);
        Ok(())
    }

    async fn get_notification(&self, notification_id: &str) -> Result<Option<Notification>> {
        Ok(self.notifications.get(notification_id).map(|n| n.clone()))
    }

    async fn notifications_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        let mut found: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_deleted)
            .map(|n| n.clone())
            .collect();
        found.sort_by(|a, b| (b.created_at, &b.id).cmp(&(a.created_at, &a.id)));
        found.truncate(limit);
        Ok(found)
    }

    async fn unread_notification_count(&self, user_id: &str) -> Result<u64> {
        Ok(self
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_deleted && !n.is_read)
            .count() as u64)
    }

    async fn mark_notification_read(&self, notification_id: &str, at: i64) -> Result<bool> {
        let Some(mut notification) = self.notifications.get_mut(notification_id) else {
            return Ok(false);
        };
        if notification.is_deleted || notification.is_read {
            return Ok(false);
        }
        notification.is_read = true;
        notification.read_at = Some(at);
        Ok(true)
    }

    async fn mark_all_notifications_read(&self, user_id: &str, at: i64) -> Result<u64> {
        let mut updated = 0;
        for mut entry in self.notifications.iter_mut() {
            if entry.user_id == user_id && !entry.is_deleted && !entry.is_read {
                entry.is_read = true;
                entry.read_at = Some(at);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn soft_delete_notification(&self, notification_id: &str) -> Result<bool> {
        let Some(mut notification) = self.notifications.get_mut(notification_id) else {
            return Ok(false);
        };
        if notification.is_deleted {
            return Ok(false);
        }
        notification.is_deleted = true;
        Ok(true)
    }

    async fn clear_notifications(&self, user_id: &str) -> Result<u64> {
        let mut cleared = 0;
        for mut entry in self.notifications.iter_mut() {
            if entry.user_id == user_id && !entry.is_deleted {
                entry.is_deleted = true;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn is_muted(&self, user_id: &str, chat_id: &str) -> Result<bool> {
        Ok(self
            .mutes
            .contains_key(&(user_id.to_string(), chat_id.to_string())))
    }

    async fn insert_mute(&self, mute: ChatMute) -> Result<()> {
        self.mutes
            .insert((mute.user_id.clone(), mute.chat_id.clone()), mute);
        Ok(())
    }

    async fn remove_mute(&self, user_id: &str, chat_id: &str) -> Result<()> {
        self.mutes
            .remove(&(user_id.to_string(), chat_id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn chat(id: &str, kind: ChatKind, participants: Vec<&str>) -> Chat {
        let mut participants: Vec<String> = participants.into_iter().map(String::from).collect();
        participants.sort();
        Chat {
            id: id.to_string(),
            kind,
            name: None,
            participants,
            last_message_id: None,
            last_message_preview: None,
            last_messaged_at: None,
            unread_count: HashMap::new(),
            starred: false,
            pinned: false,
            muted: false,
            archived: false,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn message(id: &str, chat_id: &str, sender: &str, timestamp: i64) -> Message {
        Message {
            id: id.to_string(),
            chat_id: chat_id.to_string(),
            sender_id: sender.to_string(),
            recipient_ids: vec!["user2".to_string()],
            content: Some("hello".to_string()),
            attachment_ids: vec![],
            kind: crate::models::MessageKind::Text,
            reply_to: None,
            timestamp,
            delivered_to: vec![],
            read_by: vec![],
            read: false,
            read_at: None,
            reactions: vec![],
        }
    }

    fn attachment(id: &str, uploaded_at: i64) -> Attachment {
        Attachment {
            id: id.to_string(),
            filename: format!("{}.png", id),
            original_name: "photo.png".to_string(),
            mime_type: "image/png".to_string(),
            file_extension: "png".to_string(),
            file_size: 42,
            url: None,
            uploaded_by: "user1".to_string(),
            uploaded_at,
            chat_id: "chat1".to_string(),
            message_id: None,
            status: AttachmentStatus::Uploading,
            virus_scan: VirusScanStatus::Pending,
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_bump_unread_clamps_at_zero() {
        let store = MemoryStore::new();
        store
            .insert_chat(chat("chat1", ChatKind::Direct, vec!["a", "b"]))
            .await
            .unwrap();

        store.bump_unread("chat1", "b", -5).await.unwrap();
        let chat = store.get_chat("chat1").await.unwrap().unwrap();
        assert_eq!(chat.unread_count.get("b"), Some(&0));

        store.bump_unread("chat1", "b", 1).await.unwrap();
        store.bump_unread("chat1", "b", 1).await.unwrap();
        let chat = store.get_chat("chat1").await.unwrap().unwrap();
        assert_eq!(chat.unread_count.get("b"), Some(&2));
    }

    #[tokio::test]
    async fn test_bump_unread_is_atomic_across_tasks() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_chat(chat("chat1", ChatKind::Group, vec!["a", "b", "c"]))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.bump_unread("chat1", "b", 1).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let chat = store.get_chat("chat1").await.unwrap().unwrap();
        assert_eq!(chat.unread_count.get("b"), Some(&50));
    }

    #[tokio::test]
    async fn test_find_direct_chat_ignores_order() {
        let store = MemoryStore::new();
        store
            .insert_chat(chat("chat1", ChatKind::Direct, vec!["b", "a"]))
            .await
            .unwrap();
        store
            .insert_chat(chat("chat2", ChatKind::Group, vec!["a", "b", "c"]))
            .await
            .unwrap();

        let found = store.find_direct_chat("a", "b").await.unwrap().unwrap();
        assert_eq!(found.id, "chat1");
        let found = store.find_direct_chat("b", "a").await.unwrap().unwrap();
        assert_eq!(found.id, "chat1");
        assert!(store.find_direct_chat("a", "c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_messages_for_chat_pagination() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .insert_message(message(&format!("m{}", i), "chat1", "a", 1000 + i))
                .await
                .unwrap();
        }

        let page = store.messages_for_chat("chat1", 2, None).await.unwrap();
        assert_eq!(
            page.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec!["m3", "m4"]
        );

        let page = store.messages_for_chat("chat1", 2, Some(1003)).await.unwrap();
        assert_eq!(
            page.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec!["m1", "m2"]
        );
    }

    #[tokio::test]
    async fn test_append_read_synthesizes_delivery() {
        let store = MemoryStore::new();
        store
            .insert_message(message("m1", "chat1", "a", 1000))
            .await
            .unwrap();

        assert!(store.append_read("m1", "b", 2000).await.unwrap());
        let msg = store.get_message("m1").await.unwrap().unwrap();
        assert!(msg.delivered_for("b"));
        assert!(msg.read_for("b"));
        assert!(msg.read);
        assert_eq!(msg.read_at, Some(2000));

        // Second read is a no-op and leaves a single pair of entries.
        assert!(!store.append_read("m1", "b", 3000).await.unwrap());
        let msg = store.get_message("m1").await.unwrap().unwrap();
        assert_eq!(msg.read_by.len(), 1);
        assert_eq!(msg.delivered_to.len(), 1);
        assert_eq!(msg.read_at, Some(2000));
    }

    #[tokio::test]
    async fn test_append_delivery_after_read_is_noop() {
        let store = MemoryStore::new();
        store
            .insert_message(message("m1", "chat1", "a", 1000))
            .await
            .unwrap();

        assert!(store.append_read("m1", "b", 2000).await.unwrap());
        assert!(!store.append_delivery("m1", "b", 3000).await.unwrap());
        let msg = store.get_message("m1").await.unwrap().unwrap();
        assert_eq!(msg.delivered_to.len(), 1);
        assert_eq!(msg.delivered_to[0].at, 2000);
    }

    #[tokio::test]
    async fn test_attachment_terminal_states_never_revert() {
        let store = MemoryStore::new();
        store.insert_attachment(attachment("a1", 1000)).await.unwrap();

        assert!(store
            .mark_attachment_error("a1", "sink unavailable".to_string())
            .await
            .unwrap());
        assert!(!store
            .complete_attachment("a1", "file:///x".to_string(), Map::new())
            .await
            .unwrap());

        let record = store.get_attachment("a1").await.unwrap().unwrap();
        assert_eq!(record.status, AttachmentStatus::Error);
        assert!(record.url.is_none());
        assert_eq!(
            record.metadata.get("error"),
            Some(&Value::String("sink unavailable".to_string()))
        );
    }

    #[tokio::test]
    async fn test_stalled_uploads_filters_by_cutoff_and_status() {
        let store = MemoryStore::new();
        store.insert_attachment(attachment("old", 1000)).await.unwrap();
        store.insert_attachment(attachment("new", 9000)).await.unwrap();
        let mut done = attachment("done", 1000);
        done.status = AttachmentStatus::Ready;
        store.insert_attachment(done).await.unwrap();

        let stalled = store.stalled_uploads(5000).await.unwrap();
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].id, "old");
    }

    #[tokio::test]
    async fn test_notification_listing_skips_deleted() {
        let store = MemoryStore::new();
        for i in 0..3 {
            store
                .insert_notification(Notification {
                    id: format!("n{}", i),
                    user_id: "b".to_string(),
                    kind: crate::models::NotificationKind::Message,
                    title: "New message".to_string(),
                    content: "a: hi".to_string(),
                    related_user_id: None,
                    related_message_id: None,
                    related_chat_id: None,
                    is_read: false,
                    is_deleted: false,
                    read_at: None,
                    created_at: 1000 + i,
                })
                .await
                .unwrap();
        }

        assert!(store.soft_delete_notification("n1").await.unwrap());
        let listed = store.notifications_for_user("b", 10).await.unwrap();
        assert_eq!(
            listed.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            vec!["n2", "n0"]
        );
        assert_eq!(store.unread_notification_count("b").await.unwrap(), 2);

        assert_eq!(store.mark_all_notifications_read("b", 5000).await.unwrap(), 2);
        assert_eq!(store.unread_notification_count("b").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mute_roundtrip_is_idempotent() {
        let store = MemoryStore::new();
        assert!(!store.is_muted("a", "chat1").await.unwrap());

        let mute = ChatMute {
            user_id: "a".to_string(),
            chat_id: "chat1".to_string(),
            created_at: 1000,
        };
        store.insert_mute(mute.clone()).await.unwrap();
        store.insert_mute(mute).await.unwrap();
        assert!(store.is_muted("a", "chat1").await.unwrap());

        store.remove_mute("a", "chat1").await.unwrap();
        store.remove_mute("a", "chat1").await.unwrap();
        assert!(!store.is_muted("a", "chat1").await.unwrap());
    }
}

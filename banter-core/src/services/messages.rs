use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::ServerEvent;
use crate::hub::Hub;
use crate::limits::MAX_EMOJI_LENGTH;
use crate::models::input::{GetMessagesInput, SendMessageInput, ValidateExt};
use crate::models::{Message, MessageRole};
use crate::store::DocumentStore;

use super::chats::{preview_of, ChatService};
use super::notifications::NotificationService;

/// Message lifecycle: send, history, per-(message, user) delivery/read
/// tracking, deletion and reactions.
pub struct MessageService {
    store: Arc<dyn DocumentStore>,
    hub: Arc<Hub>,
    chats: Arc<ChatService>,
    notifications: Arc<NotificationService>,
}

impl MessageService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        hub: Arc<Hub>,
        chats: Arc<ChatService>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            store,
            hub,
            chats,
            notifications,
        }
    }

    /// Full send pipeline: validate, resolve the chat, persist, update the
    /// chat aggregate, fan out notifications, broadcast `newMessage`. The
    /// steps after the insert are not transactional with it.
    pub async fn send_message(&self, input: SendMessageInput) -> Result<Message> {
        input.validate_input()?;

        // Whitespace-only content counts as absent.
        let content = input
            .content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from);
        if content.is_none() && input.attachment_ids.is_empty() {
            return Err(Error::InvalidArgument(
                "must have either content or attachments".to_string(),
            ));
        }

        let chat = self
            .chats
            .resolve_or_create(
                &input.sender_id,
                &input.recipient_ids,
                input.chat_id.as_deref(),
                None,
            )
            .await?;
        if !chat.is_participant(&input.sender_id) {
            return Err(Error::Forbidden(
                "sender is not a participant of this chat".to_string(),
            ));
        }

        if let Some(reply_id) = &input.reply_to {
            let target = self
                .store
                .get_message(reply_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("message {}", reply_id)))?;
            if target.chat_id != chat.id {
                return Err(Error::InvalidArgument(
                    "reply_to must reference a message in the same chat".to_string(),
                ));
            }
        }

        let recipient_ids: Vec<String> = chat
            .participants
            .iter()
            .filter(|p| **p != input.sender_id)
            .cloned()
            .collect();
        let message = Message {
            id: Uuid::new_v4().to_string(),
            chat_id: chat.id.clone(),
            sender_id: input.sender_id.clone(),
            recipient_ids,
            content,
            attachment_ids: input.attachment_ids.clone(),
            kind: input.kind,
            reply_to: input.reply_to.clone(),
            timestamp: Utc::now().timestamp_millis(),
            delivered_to: vec![],
            read_by: vec![],
            read: false,
            read_at: None,
            reactions: vec![],
        };
        self.store.insert_message(message.clone()).await?;
        for attachment_id in &message.attachment_ids {
            self.store
                .bind_attachment_message(attachment_id, &message.id)
                .await?;
        }

        self.chats.apply_sent_message(&chat, &message).await?;
        self.notifications
            .fan_out_message(
                &message.sender_id,
                &message.recipient_ids,
                &message.id,
                &chat.id,
                &preview_of(&message),
            )
            .await;
        self.hub.publish_to_chat(
            &chat.id,
            &message.recipient_ids,
            &ServerEvent::NewMessage {
                message: message.clone(),
            },
        );
        debug!("message {} sent to chat {}", message.id, chat.id);
        Ok(message)
    }

    /// Newest-first pagination window, returned in ascending order.
    pub async fn get_messages(&self, input: GetMessagesInput) -> Result<Vec<Message>> {
        input.validate_input()?;
        self.store
            .get_chat(&input.chat_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("chat {}", input.chat_id)))?;
        self.store
            .messages_for_chat(&input.chat_id, input.limit, input.before)
            .await
    }

    pub async fn get_messages_by_user(
        &self,
        user_id: &str,
        role: MessageRole,
    ) -> Result<Vec<Message>> {
        self.store.messages_by_user(user_id, role).await
    }

    /// Records delivery for one recipient; the sender's own receipt slot does
    /// not exist, so a sender call is a no-op.
    pub async fn mark_delivered(&self, message_id: &str, user_id: &str) -> Result<()> {
        let message = self.require_message(message_id).await?;
        if message.sender_id == user_id {
            return Ok(());
        }
        let now = Utc::now().timestamp_millis();
        if self.store.append_delivery(message_id, user_id, now).await? {
            self.hub.publish_to_user(
                &message.sender_id,
                &ServerEvent::MessageDelivered {
                    message_id: message_id.to_string(),
                    chat_id: message.chat_id.clone(),
                    user_id: user_id.to_string(),
                    delivered_at: now,
                },
            );
        }
        Ok(())
    }

    /// Records a read, synthesizing the delivery entry when the read arrives
    /// first. Repeat reads change nothing and emit nothing.
    pub async fn mark_read(&self, message_id: &str, user_id: &str) -> Result<()> {
        let message = self.require_message(message_id).await?;
        if message.sender_id == user_id {
            return Ok(());
        }
        let now = Utc::now().timestamp_millis();
        if self.store.append_read(message_id, user_id, now).await? {
            let event = ServerEvent::MessageRead {
                message_id: message_id.to_string(),
                chat_id: message.chat_id.clone(),
                user_id: user_id.to_string(),
                read_at: now,
            };
            // Sender's user-room plus the chat-room, one send per connection.
            self.hub
                .publish_to_chat(&message.chat_id, &[message.sender_id.clone()], &event);
        }
        Ok(())
    }

    /// Reads everything the user has not read in the chat and zeroes their
    /// unread counter. Emits one aggregated event per affected sender plus a
    /// bulk event to the chat-room; a second call finds nothing to do.
    pub async fn mark_chat_read(&self, chat_id: &str, user_id: &str) -> Result<usize> {
        self.store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("chat {}", chat_id)))?;

        let pending = self.store.unread_messages_for(chat_id, user_id).await?;
        let now = Utc::now().timestamp_millis();
        let mut by_sender: HashMap<String, Vec<String>> = HashMap::new();
        let mut affected: Vec<String> = Vec::new();
        for message in pending {
            if self.store.append_read(&message.id, user_id, now).await? {
                by_sender
                    .entry(message.sender_id.clone())
                    .or_default()
                    .push(message.id.clone());
                affected.push(message.id);
            }
        }
        let total = affected.len();

        // The counter reset runs even when nothing was pending.
        self.store.reset_unread(chat_id, user_id).await?;

        for (sender_id, message_ids) in by_sender {
            let count = message_ids.len();
            self.hub.publish_to_user(
                &sender_id,
                &ServerEvent::MessagesRead {
                    chat_id: chat_id.to_string(),
                    user_id: user_id.to_string(),
                    message_ids,
                    count,
                },
            );
        }
        if !affected.is_empty() {
            self.hub.publish_to_chat(
                chat_id,
                &[],
                &ServerEvent::MessagesRead {
                    chat_id: chat_id.to_string(),
                    user_id: user_id.to_string(),
                    message_ids: affected,
                    count: total,
                },
            );
        }
        Ok(total)
    }

    /// Sender-only hard delete.
    pub async fn delete_message(&self, message_id: &str, user_id: &str) -> Result<()> {
        let message = self.require_message(message_id).await?;
        if message.sender_id != user_id {
            return Err(Error::Forbidden(
                "only the sender can delete a message".to_string(),
            ));
        }
        self.store.delete_message(message_id).await?;
        self.hub.publish_to_chat(
            &message.chat_id,
            &message.recipient_ids,
            &ServerEvent::MessageDeleted {
                message_id: message_id.to_string(),
                chat_id: message.chat_id.clone(),
            },
        );
        Ok(())
    }

    /// Idempotent per (emoji, user); the reactor must be a participant.
    pub async fn add_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<()> {
        self.check_emoji(emoji)?;
        let message = self.require_message(message_id).await?;
        self.require_participant(&message.chat_id, user_id).await?;
        if self.store.add_reaction(message_id, user_id, emoji).await? {
            self.hub.publish_to_chat(
                &message.chat_id,
                &[],
                &ServerEvent::ReactionAdded {
                    message_id: message_id.to_string(),
                    chat_id: message.chat_id.clone(),
                    user_id: user_id.to_string(),
                    emoji: emoji.to_string(),
                },
            );
        }
        Ok(())
    }

    pub async fn remove_reaction(
        &self,
        message_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> Result<()> {
        self.check_emoji(emoji)?;
        let message = self.require_message(message_id).await?;
        self.require_participant(&message.chat_id, user_id).await?;
        if self.store.remove_reaction(message_id, user_id, emoji).await? {
            self.hub.publish_to_chat(
                &message.chat_id,
                &[],
                &ServerEvent::ReactionRemoved {
                    message_id: message_id.to_string(),
                    chat_id: message.chat_id.clone(),
                    user_id: user_id.to_string(),
                    emoji: emoji.to_string(),
                },
            );
        }
        Ok(())
    }

    async fn require_message(&self, message_id: &str) -> Result<Message> {
        self.store
            .get_message(message_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {}", message_id)))
    }

    async fn require_participant(&self, chat_id: &str, user_id: &str) -> Result<()> {
        let chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("chat {}", chat_id)))?;
        if !chat.is_participant(user_id) {
            return Err(Error::Forbidden(
                "user is not a participant of this chat".to_string(),
            ));
        }
        Ok(())
    }

    fn check_emoji(&self, emoji: &str) -> Result<()> {
        if emoji.is_empty() || emoji.len() > MAX_EMOJI_LENGTH {
            return Err(Error::InvalidArgument("invalid reaction emoji".to_string()));
        }
        Ok(())
    }
}

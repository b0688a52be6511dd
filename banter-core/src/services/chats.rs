use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::ServerEvent;
use crate::hub::Hub;
use crate::models::input::{CreateChatInput, UpdateChatInput, ValidateExt};
use crate::models::{Chat, ChatKind, ChatView, Message, User};
use crate::store::DocumentStore;

/// Chat aggregate manager: creation/reuse, the denormalized preview and
/// unread counters, settings, and deletion with its message cascade.
pub struct ChatService {
    store: Arc<dyn DocumentStore>,
    hub: Arc<Hub>,
}

impl ChatService {
    pub fn new(store: Arc<dyn DocumentStore>, hub: Arc<Hub>) -> Self {
        Self { store, hub }
    }

    /// Collaborator-facing chat creation. Direct pairs reuse the existing
    /// chat instead of creating a second one.
    pub async fn create_chat(&self, input: CreateChatInput) -> Result<ChatView> {
        input.validate_input()?;
        let chat = self
            .resolve_or_create(&input.sender_id, &input.recipient_ids, None, input.name)
            .await?;
        self.view_of(chat).await
    }

    /// Resolves the target chat for a message: an explicit id must exist,
    /// otherwise the participant set names (or creates) the chat.
    pub async fn resolve_or_create(
        &self,
        sender_id: &str,
        recipient_ids: &[String],
        explicit_chat_id: Option<&str>,
        name: Option<String>,
    ) -> Result<Chat> {
        if let Some(chat_id) = explicit_chat_id {
            return self
                .store
                .get_chat(chat_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("chat {}", chat_id)));
        }

        let mut participants: Vec<String> = recipient_ids.to_vec();
        participants.push(sender_id.to_string());
        participants.sort();
        participants.dedup();
        if participants.len() < 2 {
            return Err(Error::InvalidArgument(
                "a chat needs at least two distinct participants".to_string(),
            ));
        }

        let kind = if participants.len() == 2 {
            ChatKind::Direct
        } else {
            ChatKind::Group
        };

        if kind == ChatKind::Direct {
            if let Some(existing) = self
                .store
                .find_direct_chat(&participants[0], &participants[1])
                .await?
            {
                return Ok(existing);
            }
        }

        let now = Utc::now().timestamp_millis();
        let unread_count: HashMap<String, u64> =
            participants.iter().map(|p| (p.clone(), 0)).collect();
        let chat = Chat {
            id: Uuid::new_v4().to_string(),
            kind,
            name: match kind {
                ChatKind::Group => name,
                ChatKind::Direct => None,
            },
            participants,
            last_message_id: None,
            last_message_preview: None,
            last_messaged_at: None,
            unread_count,
            starred: false,
            pinned: false,
            muted: false,
            archived: false,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_chat(chat.clone()).await?;
        info!("created {:?} chat {}", chat.kind, chat.id);
        Ok(chat)
    }

    /// Chat-side bookkeeping after a message lands: preview fields plus one
    /// atomic unread increment per participant other than the sender. Not
    /// transactional with the message insert; a stale preview is tolerated.
    pub async fn apply_sent_message(&self, chat: &Chat, message: &Message) -> Result<()> {
        let preview = preview_of(message);
        self.store
            .set_chat_preview(
                &chat.id,
                Some(message.id.clone()),
                Some(preview),
                Some(message.timestamp),
            )
            .await?;
        for participant in &chat.participants {
            if participant != &message.sender_id {
                self.store.bump_unread(&chat.id, participant, 1).await?;
            }
        }
        Ok(())
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<ChatView> {
        let chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("chat {}", chat_id)))?;
        self.view_of(chat).await
    }

    pub async fn list_chats(&self) -> Result<Vec<Chat>> {
        let mut chats = self.store.all_chats().await?;
        chats.sort_by_key(|c| std::cmp::Reverse(c.last_messaged_at.unwrap_or(c.created_at)));
        Ok(chats)
    }

    /// Chats the user participates in, most recently messaged first.
    pub async fn get_user_chats(&self, user_id: &str) -> Result<Vec<ChatView>> {
        let mut chats = self.store.chats_for_user(user_id).await?;
        chats.sort_by_key(|c| std::cmp::Reverse(c.last_messaged_at.unwrap_or(c.created_at)));
        let mut views = Vec::with_capacity(chats.len());
        for chat in chats {
            views.push(self.view_of(chat).await?);
        }
        Ok(views)
    }

    /// Applies the whitelisted settings fields and broadcasts the refreshed
    /// chat to every participant.
    pub async fn update_chat_settings(
        &self,
        chat_id: &str,
        patch: UpdateChatInput,
    ) -> Result<ChatView> {
        patch.validate_input()?;
        let chat = self
            .store
            .apply_chat_settings(chat_id, &patch)
            .await?
            .ok_or_else(|| Error::NotFound(format!("chat {}", chat_id)))?;
        let participants = chat.participants.clone();
        let view = self.view_of(chat).await?;
        self.hub.publish_to_users(
            &participants,
            &ServerEvent::ChatUpdated { chat: view.clone() },
        );
        Ok(view)
    }

    /// Deletes the chat and every message in it, then tells the participants.
    pub async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        let chat = self
            .store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("chat {}", chat_id)))?;
        let removed = self.store.delete_chat_messages(chat_id).await?;
        self.store.delete_chat(chat_id).await?;
        info!("deleted chat {} and {} messages", chat_id, removed);
        self.hub.publish_to_users(
            &chat.participants,
            &ServerEvent::ChatDeleted {
                chat_id: chat_id.to_string(),
            },
        );
        Ok(())
    }

    pub async fn reset_unread(&self, chat_id: &str, user_id: &str) -> Result<()> {
        self.store.reset_unread(chat_id, user_id).await
    }

    async fn view_of(&self, chat: Chat) -> Result<ChatView> {
        let mut participant_details: Vec<User> = Vec::with_capacity(chat.participants.len());
        for participant in &chat.participants {
            match self.store.get_user(participant).await? {
                Some(user) => participant_details.push(user),
                None => debug!("participant {} has no user record", participant),
            }
        }
        Ok(ChatView {
            chat,
            participant_details,
        })
    }
}

/// Denormalized preview line: the text, else an attachment count, else the
/// message kind.
pub(crate) fn preview_of(message: &Message) -> String {
    if let Some(content) = message.content.as_deref().filter(|c| !c.is_empty()) {
        return content.to_string();
    }
    if !message.attachment_ids.is_empty() {
        return format!("{} attachment(s)", message.attachment_ids.len());
    }
    message.kind.as_str().to_string()
}

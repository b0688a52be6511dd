use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::ServerEvent;
use crate::hub::Hub;
use crate::limits::NOTIFICATION_PREVIEW_LENGTH;
use crate::models::input::is_well_formed_id;
use crate::models::{ChatMute, Notification, NotificationKind};
use crate::store::DocumentStore;

const MESSAGE_NOTIFICATION_TITLE: &str = "New message";

/// Notification fan-out with per-chat mute suppression.
///
/// Mute state is a dedicated record keyed by (user, chat); it never shows up
/// in listing or counting results. One recipient failing never aborts the
/// rest of a fan-out.
pub struct NotificationService {
    store: Arc<dyn DocumentStore>,
    hub: Arc<Hub>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn DocumentStore>, hub: Arc<Hub>) -> Self {
        Self { store, hub }
    }

    pub async fn is_muted(&self, user_id: &str, chat_id: &str) -> Result<bool> {
        self.store.is_muted(user_id, chat_id).await
    }

    /// Idempotent. Muting suppresses future message notifications for this
    /// chat only; existing ones stay.
    pub async fn mute_chat(&self, user_id: &str, chat_id: &str) -> Result<()> {
        self.store
            .insert_mute(ChatMute {
                user_id: user_id.to_string(),
                chat_id: chat_id.to_string(),
                created_at: Utc::now().timestamp_millis(),
            })
            .await
    }

    pub async fn unmute_chat(&self, user_id: &str, chat_id: &str) -> Result<()> {
        self.store.remove_mute(user_id, chat_id).await
    }

    /// Creates and pushes one Message notification per eligible recipient.
    /// Malformed ids, the sender, unknown or deleted users and muted
    /// recipients are skipped; a failure for one recipient is logged and the
    /// loop continues.
    pub async fn fan_out_message(
        &self,
        sender_id: &str,
        recipient_ids: &[String],
        message_id: &str,
        chat_id: &str,
        preview: &str,
    ) {
        let sender_name = match self.store.get_user(sender_id).await {
            Ok(Some(user)) => user.display_name,
            _ => sender_id.to_string(),
        };
        let content = format!("{}: {}", sender_name, truncate_preview(preview));

        for recipient in recipient_ids {
            if !is_well_formed_id(recipient) {
                warn!("skipping malformed recipient id in fan-out");
                continue;
            }
            if recipient == sender_id {
                continue;
            }
            match self.store.get_user(recipient).await {
                Ok(Some(user)) if !user.deleted => {}
                Ok(_) => {
                    debug!("skipping unknown or deleted recipient {}", recipient);
                    continue;
                }
                Err(e) => {
                    warn!("recipient lookup failed for {}: {}", recipient, e);
                    continue;
                }
            }
            match self.store.is_muted(recipient, chat_id).await {
                Ok(true) => {
                    debug!("chat {} muted for {}, skipping", chat_id, recipient);
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("mute lookup failed for {}: {}", recipient, e);
                    continue;
                }
            }

            let notification = Notification {
                id: Uuid::new_v4().to_string(),
                user_id: recipient.clone(),
                kind: NotificationKind::Message,
                title: MESSAGE_NOTIFICATION_TITLE.to_string(),
                content: content.clone(),
                related_user_id: Some(sender_id.to_string()),
                related_message_id: Some(message_id.to_string()),
                related_chat_id: Some(chat_id.to_string()),
                is_read: false,
                is_deleted: false,
                read_at: None,
                created_at: Utc::now().timestamp_millis(),
            };
            if let Err(e) = self.store.insert_notification(notification.clone()).await {
                warn!("could not store notification for {}: {}", recipient, e);
                continue;
            }
            self.hub
                .publish_to_user(recipient, &ServerEvent::NewNotification { notification });
        }
    }

    /// System notifications skip the mute check; partial failures are
    /// isolated the same way as message fan-out.
    pub async fn create_system_notification(
        &self,
        user_ids: &[String],
        title: &str,
        content: &str,
    ) -> Vec<Notification> {
        let mut created = Vec::new();
        for user_id in user_ids {
            if !is_well_formed_id(user_id) {
                warn!("skipping malformed user id in system notification");
                continue;
            }
            let notification = Notification {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.clone(),
                kind: NotificationKind::System,
                title: title.to_string(),
                content: content.to_string(),
                related_user_id: None,
                related_message_id: None,
                related_chat_id: None,
                is_read: false,
                is_deleted: false,
                read_at: None,
                created_at: Utc::now().timestamp_millis(),
            };
            if let Err(e) = self.store.insert_notification(notification.clone()).await {
                warn!("could not store system notification for {}: {}", user_id, e);
                continue;
            }
            self.hub.publish_to_user(
                user_id,
                &ServerEvent::NewNotification {
                    notification: notification.clone(),
                },
            );
            created.push(notification);
        }
        created
    }

    pub async fn list_notifications(&self, user_id: &str, limit: usize) -> Result<Vec<Notification>> {
        self.store.notifications_for_user(user_id, limit).await
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<u64> {
        self.store.unread_notification_count(user_id).await
    }

    pub async fn mark_read(&self, notification_id: &str, user_id: &str) -> Result<()> {
        self.owned(notification_id, user_id).await?;
        self.store
            .mark_notification_read(notification_id, Utc::now().timestamp_millis())
            .await?;
        Ok(())
    }

    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        self.store
            .mark_all_notifications_read(user_id, Utc::now().timestamp_millis())
            .await
    }

    /// Soft delete; the record stops appearing in lists and counts.
    pub async fn delete_notification(&self, notification_id: &str, user_id: &str) -> Result<()> {
        self.owned(notification_id, user_id).await?;
        self.store.soft_delete_notification(notification_id).await?;
        Ok(())
    }

    pub async fn clear_all(&self, user_id: &str) -> Result<u64> {
        self.store.clear_notifications(user_id).await
    }

    async fn owned(&self, notification_id: &str, user_id: &str) -> Result<()> {
        let notification = self
            .store
            .get_notification(notification_id)
            .await?
            .filter(|n| !n.is_deleted)
            .ok_or_else(|| Error::NotFound(format!("notification {}", notification_id)))?;
        if notification.user_id != user_id {
            return Err(Error::Forbidden(
                "notification belongs to another user".to_string(),
            ));
        }
        Ok(())
    }
}

fn truncate_preview(preview: &str) -> String {
    if preview.chars().count() > NOTIFICATION_PREVIEW_LENGTH {
        let cut: String = preview.chars().take(NOTIFICATION_PREVIEW_LENGTH).collect();
        format!("{}...", cut)
    } else {
        preview.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::store::MemoryStore;

    async fn service_with_users(users: &[(&str, bool)]) -> (Arc<MemoryStore>, NotificationService) {
        let store = Arc::new(MemoryStore::new());
        for (id, deleted) in users {
            store
                .insert_user(User {
                    id: id.to_string(),
                    tenant_id: "t1".to_string(),
                    display_name: format!("{} Display", id),
                    deleted: *deleted,
                })
                .await
                .unwrap();
        }
        let svc = NotificationService::new(store.clone(), Arc::new(Hub::new()));
        (store, svc)
    }

    #[tokio::test]
    async fn test_fan_out_skips_sender_unknown_deleted_and_malformed() {
        let (_, svc) = service_with_users(&[("a", false), ("b", false), ("gone", true)]).await;

        svc.fan_out_message(
            "a",
            &[
                "a".to_string(),
                "b".to_string(),
                "gone".to_string(),
                "ghost".to_string(),
                "".to_string(),
            ],
            "m1",
            "chat1",
            "hi there",
        )
        .await;

        let for_b = svc.list_notifications("b", 10).await.unwrap();
        assert_eq!(for_b.len(), 1);
        assert_eq!(for_b[0].title, "New message");
        assert_eq!(for_b[0].content, "a Display: hi there");
        assert_eq!(for_b[0].related_chat_id.as_deref(), Some("chat1"));
        assert!(svc.list_notifications("a", 10).await.unwrap().is_empty());
        assert!(svc.list_notifications("gone", 10).await.unwrap().is_empty());
        assert!(svc.list_notifications("ghost", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mute_suppresses_without_retroaction() {
        let (_, svc) = service_with_users(&[("a", false), ("b", false)]).await;

        svc.fan_out_message("a", &["b".to_string()], "m1", "chat1", "first")
            .await;
        svc.mute_chat("b", "chat1").await.unwrap();
        svc.fan_out_message("a", &["b".to_string()], "m2", "chat1", "second")
            .await;

        // The pre-mute notification stays; the muted one was never created.
        let listed = svc.list_notifications("b", 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].content.contains("first"));

        // Unmuting does not conjure the suppressed one up.
        svc.unmute_chat("b", "chat1").await.unwrap();
        assert_eq!(svc.list_notifications("b", 10).await.unwrap().len(), 1);

        // Mute only applies to the muted chat.
        svc.mute_chat("b", "chat1").await.unwrap();
        svc.fan_out_message("a", &["b".to_string()], "m3", "chat2", "other chat")
            .await;
        assert_eq!(svc.list_notifications("b", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_preview_truncated_in_content() {
        let (_, svc) = service_with_users(&[("a", false), ("b", false)]).await;
        let long = "x".repeat(80);

        svc.fan_out_message("a", &["b".to_string()], "m1", "chat1", &long)
            .await;

        let listed = svc.list_notifications("b", 10).await.unwrap();
        let expected = format!("a Display: {}...", "x".repeat(NOTIFICATION_PREVIEW_LENGTH));
        assert_eq!(listed[0].content, expected);
    }

    #[tokio::test]
    async fn test_system_notifications_ignore_mutes() {
        let (_, svc) = service_with_users(&[("b", false)]).await;
        svc.mute_chat("b", "chat1").await.unwrap();

        let created = svc
            .create_system_notification(&["b".to_string()], "Maintenance", "tonight 10pm")
            .await;
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].kind, NotificationKind::System);
        assert_eq!(svc.unread_count("b").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_and_delete_require_ownership() {
        let (_, svc) = service_with_users(&[("a", false), ("b", false)]).await;
        svc.fan_out_message("a", &["b".to_string()], "m1", "chat1", "hi")
            .await;
        let id = svc.list_notifications("b", 10).await.unwrap()[0].id.clone();

        let err = svc.mark_read(&id, "a").await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        svc.mark_read(&id, "b").await.unwrap();
        assert_eq!(svc.unread_count("b").await.unwrap(), 0);
        // Marking again stays quiet.
        svc.mark_read(&id, "b").await.unwrap();

        svc.delete_notification(&id, "b").await.unwrap();
        assert!(svc.list_notifications("b", 10).await.unwrap().is_empty());
        let err = svc.mark_read(&id, "b").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_clear_all_soft_deletes_everything() {
        let (_, svc) = service_with_users(&[("a", false), ("b", false)]).await;
        svc.fan_out_message("a", &["b".to_string()], "m1", "chat1", "one")
            .await;
        svc.fan_out_message("a", &["b".to_string()], "m2", "chat1", "two")
            .await;

        assert_eq!(svc.clear_all("b").await.unwrap(), 2);
        assert!(svc.list_notifications("b", 10).await.unwrap().is_empty());
        assert_eq!(svc.unread_count("b").await.unwrap(), 0);
        assert_eq!(svc.clear_all("b").await.unwrap(), 0);
    }
}

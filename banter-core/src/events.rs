use serde::{Deserialize, Serialize};

use crate::models::{Attachment, ChatView, Message, Notification};

/// Events pushed to clients over the realtime channel.
///
/// Delivery is fire-and-forget: the document store stays authoritative and
/// clients reconcile by fetching. Payloads are serialized once at the hub
/// boundary and fanned out as JSON strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "newMessage")]
    NewMessage { message: Message },
    #[serde(rename = "messageDelivered")]
    MessageDelivered {
        message_id: String,
        chat_id: String,
        user_id: String,
        delivered_at: i64,
    },
    #[serde(rename = "messageRead")]
    MessageRead {
        message_id: String,
        chat_id: String,
        user_id: String,
        read_at: i64,
    },
    /// Bulk read event; `user_id` is the reader. Sent per distinct sender to
    /// that sender's user-room (their share of the ids) and once to the
    /// chat-room with all affected ids.
    #[serde(rename = "messagesRead")]
    MessagesRead {
        chat_id: String,
        user_id: String,
        message_ids: Vec<String>,
        count: usize,
    },
    #[serde(rename = "messageDeleted")]
    MessageDeleted { message_id: String, chat_id: String },
    #[serde(rename = "attachmentUploaded")]
    AttachmentUploaded { attachment: Attachment },
    #[serde(rename = "chatUpdated")]
    ChatUpdated { chat: ChatView },
    #[serde(rename = "chatDeleted")]
    ChatDeleted { chat_id: String },
    #[serde(rename = "newNotification")]
    NewNotification { notification: Notification },
    #[serde(rename = "reactionAdded")]
    ReactionAdded {
        message_id: String,
        chat_id: String,
        user_id: String,
        emoji: String,
    },
    #[serde(rename = "reactionRemoved")]
    ReactionRemoved {
        message_id: String,
        chat_id: String,
        user_id: String,
        emoji: String,
    },
    #[serde(rename = "typing")]
    Typing {
        chat_id: String,
        user_id: String,
        is_typing: bool,
    },
    #[serde(rename = "authenticated")]
    Authenticated { user_id: String },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "pong")]
    Pong { timestamp: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageKind, NotificationKind};

    fn sample_message() -> Message {
        Message {
            id: "msg1".to_string(),
            chat_id: "chat1".to_string(),
            sender_id: "user1".to_string(),
            recipient_ids: vec!["user2".to_string()],
            content: Some("Hello, world!".to_string()),
            attachment_ids: vec![],
            kind: MessageKind::Text,
            reply_to: None,
            timestamp: 1234567890,
            delivered_to: vec![],
            read_by: vec![],
            read: false,
            read_at: None,
            reactions: vec![],
        }
    }

    #[test]
    fn test_new_message_serialization() {
        let event = ServerEvent::NewMessage {
            message: sample_message(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"newMessage\""));
        assert!(json.contains("\"content\":\"Hello, world!\""));

        let parsed: ServerEvent = serde_json::from_str(&json).unwrap();
        if let ServerEvent::NewMessage { message } = parsed {
            assert_eq!(message.id, "msg1");
            assert_eq!(message.recipient_ids, vec!["user2"]);
        } else {
            panic!("Expected NewMessage");
        }
    }

    #[test]
    fn test_receipt_event_serialization() {
        let event = ServerEvent::MessageDelivered {
            message_id: "msg1".to_string(),
            chat_id: "chat1".to_string(),
            user_id: "user2".to_string(),
            delivered_at: 1234567890,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"messageDelivered\""));
        assert!(json.contains("\"delivered_at\":1234567890"));

        let event = ServerEvent::MessageRead {
            message_id: "msg1".to_string(),
            chat_id: "chat1".to_string(),
            user_id: "user2".to_string(),
            read_at: 1234567891,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"messageRead\""));
        assert!(json.contains("\"read_at\":1234567891"));
    }

    #[test]
    fn test_messages_read_serialization() {
        let event = ServerEvent::MessagesRead {
            chat_id: "chat1".to_string(),
            user_id: "user2".to_string(),
            message_ids: vec!["m1".to_string(), "m2".to_string()],
            count: 2,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"messagesRead\""));
        assert!(json.contains("\"message_ids\":[\"m1\",\"m2\"]"));
        assert!(json.contains("\"count\":2"));
    }

    #[test]
    fn test_notification_event_serialization() {
        let event = ServerEvent::NewNotification {
            notification: Notification {
                id: "n1".to_string(),
                user_id: "user2".to_string(),
                kind: NotificationKind::Message,
                title: "New message".to_string(),
                content: "Alice: hi".to_string(),
                related_user_id: Some("user1".to_string()),
                related_message_id: Some("msg1".to_string()),
                related_chat_id: Some("chat1".to_string()),
                is_read: false,
                is_deleted: false,
                read_at: None,
                created_at: 1234567890,
            },
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"newNotification\""));
        assert!(json.contains("\"kind\":\"message\""));
    }

    #[test]
    fn test_typing_serialization() {
        let event = ServerEvent::Typing {
            chat_id: "chat1".to_string(),
            user_id: "user1".to_string(),
            is_typing: true,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"typing\""));
        assert!(json.contains("\"is_typing\":true"));

        let parsed: ServerEvent = serde_json::from_str(&json).unwrap();
        if let ServerEvent::Typing { is_typing, .. } = parsed {
            assert!(is_typing);
        } else {
            panic!("Expected Typing");
        }
    }

    #[test]
    fn test_error_and_pong_serialization() {
        let event = ServerEvent::Error {
            message: "not a participant".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"error\""));

        let event = ServerEvent::Pong {
            timestamp: 1234567890,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"pong\""));
    }
}

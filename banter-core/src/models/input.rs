//! Input DTOs with garde validation for the collaborator-facing operations.
//!
//! These structs validate request data before it reaches the services.

use garde::Validate;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::limits::{MAX_CHAT_NAME_LENGTH, MAX_ID_LENGTH, MAX_MESSAGE_CONTENT};

use super::message::MessageKind;

/// An id is well formed when it is non-empty, within length bounds and free
/// of control characters.
pub fn is_well_formed_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= MAX_ID_LENGTH && !id.chars().any(|c| c.is_control())
}

/// Custom validation for entity ids
fn validate_id(value: &str, _ctx: &()) -> garde::Result {
    if is_well_formed_id(value) {
        Ok(())
    } else {
        Err(garde::Error::new("malformed id"))
    }
}

/// Input for sending a message
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct SendMessageInput {
    /// Explicit target chat; when absent the chat is resolved from the
    /// participant set (created if it does not exist yet).
    #[garde(inner(custom(validate_id)))]
    pub chat_id: Option<String>,
    #[garde(custom(validate_id))]
    pub sender_id: String,
    #[serde(default)]
    #[garde(inner(custom(validate_id)))]
    pub recipient_ids: Vec<String>,
    #[garde(inner(length(max = MAX_MESSAGE_CONTENT)))]
    pub content: Option<String>,
    #[serde(default)]
    #[garde(inner(custom(validate_id)))]
    pub attachment_ids: Vec<String>,
    #[garde(inner(custom(validate_id)))]
    pub reply_to: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub kind: MessageKind,
}

/// Input for paging through a chat's messages
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct GetMessagesInput {
    #[garde(custom(validate_id))]
    pub chat_id: String,
    #[garde(range(min = 1, max = 1000))]
    pub limit: usize,
    /// Exclusive cursor: only messages strictly older than this timestamp.
    #[garde(skip)]
    pub before: Option<i64>,
}

/// Input for creating (or returning the existing) chat
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct CreateChatInput {
    #[garde(custom(validate_id))]
    pub sender_id: String,
    #[garde(length(min = 1), inner(custom(validate_id)))]
    pub recipient_ids: Vec<String>,
    #[garde(inner(length(min = 1, max = MAX_CHAT_NAME_LENGTH)))]
    pub name: Option<String>,
}

/// Whitelisted chat settings update; absent fields are left untouched
#[derive(Debug, Default, Deserialize, Validate)]
#[garde(context(()))]
pub struct UpdateChatInput {
    #[garde(inner(length(min = 1, max = MAX_CHAT_NAME_LENGTH)))]
    pub name: Option<String>,
    #[garde(skip)]
    pub starred: Option<bool>,
    #[garde(skip)]
    pub pinned: Option<bool>,
    #[garde(skip)]
    pub muted: Option<bool>,
    #[garde(skip)]
    pub archived: Option<bool>,
}

/// Helper trait to convert garde validation errors to the crate error type
pub trait ValidateExt {
    fn validate_input(&self) -> Result<()>;
}

impl<T: Validate<Context = ()>> ValidateExt for T {
    fn validate_input(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::InvalidArgument(e.to_string()))
    }
}

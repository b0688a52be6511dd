//! Shared size limits and ceilings.

/// Maximum message text length in characters
pub const MAX_MESSAGE_CONTENT: usize = 1000;

/// Maximum length accepted for user/chat/message ids
pub const MAX_ID_LENGTH: usize = 128;

/// Maximum group chat name length
pub const MAX_CHAT_NAME_LENGTH: usize = 100;

/// Maximum files accepted in a single upload batch
pub const MAX_FILES_PER_BATCH: usize = 10;

/// Per-category upload ceilings in bytes
pub const MAX_IMAGE_SIZE: u64 = 10 * 1024 * 1024;
pub const MAX_DOCUMENT_SIZE: u64 = 25 * 1024 * 1024;
pub const MAX_AUDIO_SIZE: u64 = 50 * 1024 * 1024;
pub const MAX_VIDEO_SIZE: u64 = 100 * 1024 * 1024;
pub const MAX_OTHER_SIZE: u64 = 25 * 1024 * 1024;

/// Total ceiling for one upload batch in bytes
pub const MAX_BATCH_SIZE: u64 = 200 * 1024 * 1024;

/// Concurrent background upload tasks
pub const MAX_UPLOAD_WORKERS: usize = 4;

/// Characters of message text shown in a notification body
pub const NOTIFICATION_PREVIEW_LENGTH: usize = 50;

/// Maximum reaction emoji length in bytes
pub const MAX_EMOJI_LENGTH: usize = 32;

/// Default page size for message history queries
pub const DEFAULT_MESSAGE_PAGE: usize = 50;

mod attachment;
mod chat;
pub mod input;
mod message;
mod notification;
mod user;

pub use attachment::{Attachment, AttachmentStatus, FileCategory, VirusScanStatus};
pub use chat::{Chat, ChatKind, ChatView};
pub use message::{Message, MessageKind, MessageRole, Reaction, Receipt};
pub use notification::{ChatMute, Notification, NotificationKind};
pub use user::User;

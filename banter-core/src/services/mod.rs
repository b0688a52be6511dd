use std::path::PathBuf;
use std::sync::Arc;

use crate::hub::Hub;
use crate::sink::{FsObjectSink, ObjectSink};
use crate::store::{DocumentStore, MemoryStore};

mod attachments;
mod chats;
mod messages;
mod notifications;

pub use attachments::{AttachmentService, StagedFile, UploadOutcome, UploadStatus};
pub use chats::ChatService;
pub use messages::MessageService;
pub use notifications::NotificationService;

/// The wired subsystem: all four services over one store, sink and hub.
pub struct Core {
    pub store: Arc<dyn DocumentStore>,
    pub hub: Arc<Hub>,
    pub chats: Arc<ChatService>,
    pub messages: Arc<MessageService>,
    pub notifications: Arc<NotificationService>,
    pub attachments: Arc<AttachmentService>,
}

impl Core {
    pub fn new(store: Arc<dyn DocumentStore>, sink: Arc<dyn ObjectSink>, hub: Arc<Hub>) -> Self {
        let chats = Arc::new(ChatService::new(store.clone(), hub.clone()));
        let notifications = Arc::new(NotificationService::new(store.clone(), hub.clone()));
        let messages = Arc::new(MessageService::new(
            store.clone(),
            hub.clone(),
            chats.clone(),
            notifications.clone(),
        ));
        let attachments = Arc::new(AttachmentService::new(store.clone(), sink, hub.clone()));
        Self {
            store,
            hub,
            chats,
            messages,
            notifications,
            attachments,
        }
    }

    /// In-memory store with a filesystem sink; what the gateway binary and
    /// the integration tests run on.
    pub fn in_memory(upload_dir: impl Into<PathBuf>) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FsObjectSink::new(upload_dir)),
            Arc::new(Hub::new()),
        )
    }
}

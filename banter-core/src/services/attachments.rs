use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::ServerEvent;
use crate::hub::Hub;
use crate::limits::{MAX_BATCH_SIZE, MAX_FILES_PER_BATCH, MAX_UPLOAD_WORKERS};
use crate::models::{Attachment, AttachmentStatus, FileCategory, VirusScanStatus};
use crate::sink::ObjectSink;
use crate::store::DocumentStore;

/// A raw upload the collaborator layer already wrote to a temp file.
/// `size` comes from the upload transport, so batch validation never touches
/// the disk.
#[derive(Debug)]
pub struct StagedFile {
    pub path: PathBuf,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
}

/// Result of the synchronous phase: records created in `Uploading` next to
/// per-file failures that did not stop their siblings.
#[derive(Debug)]
pub struct UploadOutcome {
    pub attachments: Vec<Attachment>,
    pub errors: Vec<String>,
}

/// Poll/reconcile answer for one attachment.
#[derive(Debug, Clone, Serialize)]
pub struct UploadStatus {
    pub id: String,
    pub status: AttachmentStatus,
    pub url: Option<String>,
    pub virus_scan: VirusScanStatus,
}

/// Two-phase attachment pipeline.
///
/// The synchronous phase validates the batch as a whole, persists one
/// `Uploading` record per file and returns. A detached task per record, held
/// to a worker ceiling by a semaphore, moves the bytes to the object sink and
/// settles the record in `Ready` or `Error`; its failures become state, never
/// panics, and the temp file is removed on every path.
pub struct AttachmentService {
    store: Arc<dyn DocumentStore>,
    sink: Arc<dyn ObjectSink>,
    hub: Arc<Hub>,
    workers: Arc<Semaphore>,
}

impl AttachmentService {
    pub fn new(store: Arc<dyn DocumentStore>, sink: Arc<dyn ObjectSink>, hub: Arc<Hub>) -> Self {
        Self {
            store,
            sink,
            hub,
            workers: Arc::new(Semaphore::new(MAX_UPLOAD_WORKERS)),
        }
    }

    /// Synchronous phase. A batch-level violation rejects everything and
    /// removes every temp file; after acceptance each file stands alone.
    pub async fn accept_uploads(
        &self,
        staged: Vec<StagedFile>,
        chat_id: &str,
        user_id: &str,
        message_id: Option<String>,
    ) -> Result<UploadOutcome> {
        if staged.is_empty() {
            return Err(Error::InvalidArgument(
                "no files in upload batch".to_string(),
            ));
        }

        let mut violation: Option<String> = None;
        if staged.len() > MAX_FILES_PER_BATCH {
            violation = Some(format!(
                "too many files: {} (limit {})",
                staged.len(),
                MAX_FILES_PER_BATCH
            ));
        }
        let mut total: u64 = 0;
        if violation.is_none() {
            for file in &staged {
                if file.size == 0 {
                    violation = Some(format!("file {} is empty", file.original_name));
                    break;
                }
                let category = FileCategory::from_extension(&extension_of(&file.original_name));
                if file.size > category.max_size() {
                    violation = Some(format!(
                        "file {} exceeds the {} size limit of {} bytes",
                        file.original_name,
                        category.as_str(),
                        category.max_size()
                    ));
                    break;
                }
                total = total.saturating_add(file.size);
            }
        }
        if violation.is_none() && total > MAX_BATCH_SIZE {
            violation = Some(format!(
                "batch exceeds the total size limit of {} bytes",
                MAX_BATCH_SIZE
            ));
        }
        if let Some(reason) = violation {
            for file in &staged {
                remove_temp(&file.path).await;
            }
            return Err(Error::InvalidArgument(reason));
        }

        let now = Utc::now().timestamp_millis();
        let batch_size = staged.len();
        let mut attachments = Vec::new();
        let mut errors = Vec::new();
        for file in staged {
            // The temp file can vanish between staging and acceptance; that
            // fails this file only.
            if let Err(e) = tokio::fs::metadata(&file.path).await {
                warn!("staged file {} unreadable: {}", file.original_name, e);
                errors.push(format!("{}: {}", file.original_name, e));
                continue;
            }
            let extension = extension_of(&file.original_name);
            let record = Attachment {
                id: Uuid::new_v4().to_string(),
                filename: format!("{}.{}", Uuid::new_v4(), extension),
                original_name: file.original_name.clone(),
                mime_type: file.mime_type.clone(),
                file_extension: extension,
                file_size: file.size,
                url: None,
                uploaded_by: user_id.to_string(),
                uploaded_at: now,
                chat_id: chat_id.to_string(),
                message_id: message_id.clone(),
                status: AttachmentStatus::Uploading,
                virus_scan: VirusScanStatus::Pending,
                metadata: Map::new(),
            };
            match self.store.insert_attachment(record.clone()).await {
                Ok(()) => {
                    self.spawn_processing(record.clone(), file.path);
                    attachments.push(record);
                }
                Err(e) => {
                    warn!("could not create record for {}: {}", file.original_name, e);
                    remove_temp(&file.path).await;
                    errors.push(format!("{}: {}", file.original_name, e));
                }
            }
        }

        if attachments.is_empty() {
            return Err(Error::Store(format!(
                "every file in the batch failed: {}",
                errors.join("; ")
            )));
        }
        info!(
            "accepted {} of {} uploads for chat {}",
            attachments.len(),
            batch_size,
            chat_id
        );
        Ok(UploadOutcome {
            attachments,
            errors,
        })
    }

    fn spawn_processing(&self, record: Attachment, temp_path: PathBuf) {
        let store = self.store.clone();
        let sink = self.sink.clone();
        let hub = self.hub.clone();
        let workers = self.workers.clone();
        tokio::spawn(async move {
            let _permit = match workers.acquire_owned().await {
                Ok(permit) => permit,
                // Closed only on teardown.
                Err(_) => return,
            };
            let id = record.id.clone();
            if let Err(e) = process_upload(&store, &sink, &hub, record, &temp_path).await {
                warn!("processing attachment {} failed: {}", id, e);
                if let Err(pe) = store.mark_attachment_error(&id, e.to_string()).await {
                    warn!("could not record failure on {}: {}", id, pe);
                }
            }
            remove_temp(&temp_path).await;
        });
    }

    /// Current state of the caller's attachments; foreign and unknown ids are
    /// silently dropped from the answer.
    pub async fn get_upload_status(
        &self,
        ids: &[String],
        user_id: &str,
    ) -> Result<Vec<UploadStatus>> {
        let mut statuses = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(attachment) = self.store.get_attachment(id).await? {
                if attachment.uploaded_by == user_id {
                    statuses.push(UploadStatus {
                        id: attachment.id,
                        status: attachment.status,
                        url: attachment.url,
                        virus_scan: attachment.virus_scan,
                    });
                }
            }
        }
        Ok(statuses)
    }

    pub async fn get_attachment(&self, attachment_id: &str) -> Result<Attachment> {
        self.store
            .get_attachment(attachment_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("attachment {}", attachment_id)))
    }

    pub async fn get_chat_attachments(&self, chat_id: &str) -> Result<Vec<Attachment>> {
        self.store.attachments_for_chat(chat_id).await
    }

    pub async fn get_message_attachments(&self, message_id: &str) -> Result<Vec<Attachment>> {
        self.store.attachments_for_message(message_id).await
    }

    /// Uploader-only hard delete of the record; stored bytes may outlive it.
    pub async fn delete_attachment(&self, attachment_id: &str, user_id: &str) -> Result<()> {
        let attachment = self.get_attachment(attachment_id).await?;
        if attachment.uploaded_by != user_id {
            return Err(Error::Forbidden(
                "only the uploader can delete an attachment".to_string(),
            ));
        }
        self.store.delete_attachment(attachment_id).await
    }

    /// Marks records stuck in `Uploading` for longer than `max_age_ms` as
    /// failed. Run periodically to resolve crashes between the two phases.
    pub async fn sweep_stalled(&self, max_age_ms: i64) -> Result<u64> {
        let cutoff = Utc::now().timestamp_millis() - max_age_ms;
        let stalled = self.store.stalled_uploads(cutoff).await?;
        let mut swept = 0;
        for record in stalled {
            if self
                .store
                .mark_attachment_error(&record.id, "upload timed out".to_string())
                .await?
            {
                swept += 1;
            }
        }
        if swept > 0 {
            info!("swept {} stalled uploads", swept);
        }
        Ok(swept)
    }
}

/// Asynchronous phase for one record: best-effort image dimensions, bytes to
/// the sink, then the single terminal transition.
async fn process_upload(
    store: &Arc<dyn DocumentStore>,
    sink: &Arc<dyn ObjectSink>,
    hub: &Hub,
    record: Attachment,
    temp_path: &Path,
) -> Result<()> {
    let bytes = tokio::fs::read(temp_path).await?;

    let mut metadata = Map::new();
    if FileCategory::from_extension(&record.file_extension) == FileCategory::Image {
        match image::load_from_memory(&bytes) {
            Ok(decoded) => {
                metadata.insert("width".to_string(), Value::from(decoded.width()));
                metadata.insert("height".to_string(), Value::from(decoded.height()));
            }
            Err(e) => debug!("no dimensions for {}: {}", record.filename, e),
        }
    }

    let url = sink.put(&record.filename, &bytes).await?;
    if store
        .complete_attachment(&record.id, url, metadata)
        .await?
    {
        if let Some(ready) = store.get_attachment(&record.id).await? {
            hub.publish_to_chat(
                &record.chat_id,
                &[],
                &ServerEvent::AttachmentUploaded { attachment: ready },
            );
        }
    } else {
        debug!(
            "attachment {} already terminal, upload result dropped",
            record.id
        );
    }
    Ok(())
}

async fn remove_temp(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!("temp file {} not removed: {}", path.display(), e);
        }
    }
}

/// Lowercased, alphanumeric-only extension; `bin` when there is none.
fn extension_of(name: &str) -> String {
    let ext: String = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(10)
        .collect();
    if ext.is_empty() {
        "bin".to_string()
    } else {
        ext.to_ascii_lowercase()
    }
}

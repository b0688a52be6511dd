use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::limits;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentStatus {
    Uploading,
    Ready,
    Error,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VirusScanStatus {
    Pending,
    Clean,
    Infected,
}

/// Upload size category, derived from the file extension. Each category
/// carries its own byte ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Image,
    Document,
    Audio,
    Video,
    Other,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Image => "image",
            FileCategory::Document => "document",
            FileCategory::Audio => "audio",
            FileCategory::Video => "video",
            FileCategory::Other => "other",
        }
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "svg" => FileCategory::Image,
            "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "txt" | "csv" | "md" => {
                FileCategory::Document
            }
            "mp3" | "wav" | "ogg" | "m4a" | "flac" => FileCategory::Audio,
            "mp4" | "mov" | "avi" | "mkv" | "webm" => FileCategory::Video,
            _ => FileCategory::Other,
        }
    }

    pub fn max_size(&self) -> u64 {
        match self {
            FileCategory::Image => limits::MAX_IMAGE_SIZE,
            FileCategory::Document => limits::MAX_DOCUMENT_SIZE,
            FileCategory::Audio => limits::MAX_AUDIO_SIZE,
            FileCategory::Video => limits::MAX_VIDEO_SIZE,
            FileCategory::Other => limits::MAX_OTHER_SIZE,
        }
    }
}

/// An uploaded file's metadata record.
///
/// Created in `Uploading`/`Pending` by the synchronous phase; the detached
/// background task that owns the record moves it exactly once to `Ready` or
/// `Error`. `url` stays empty until the bytes reach object storage.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Attachment {
    pub id: String,
    /// Generated, collision-resistant storage name: `{uuid}.{ext}`.
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub file_extension: String,
    pub file_size: u64,
    pub url: Option<String>,
    pub uploaded_by: String,
    pub uploaded_at: i64,
    pub chat_id: String,
    pub message_id: Option<String>,
    pub status: AttachmentStatus,
    pub virus_scan: VirusScanStatus,
    /// Free-form: image dimensions on success, last error on failure.
    pub metadata: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_extension() {
        assert_eq!(FileCategory::from_extension("PNG"), FileCategory::Image);
        assert_eq!(FileCategory::from_extension("pdf"), FileCategory::Document);
        assert_eq!(FileCategory::from_extension("mp3"), FileCategory::Audio);
        assert_eq!(FileCategory::from_extension("mkv"), FileCategory::Video);
        assert_eq!(FileCategory::from_extension("exe"), FileCategory::Other);
        assert_eq!(FileCategory::from_extension(""), FileCategory::Other);
    }

    #[test]
    fn test_category_ceilings_ordered() {
        assert!(FileCategory::Image.max_size() < FileCategory::Video.max_size());
        assert!(FileCategory::Audio.max_size() < FileCategory::Video.max_size());
    }
}

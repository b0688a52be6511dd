use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};

/// Durable object storage behind the attachment pipeline. Implementations
/// return a url the stored object is reachable under.
#[async_trait]
pub trait ObjectSink: Send + Sync {
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<String>;
}

/// Filesystem-backed sink. Objects land under a root directory and are
/// addressed with `file://` urls.
pub struct FsObjectSink {
    root: PathBuf,
}

impl FsObjectSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectSink for FsObjectSink {
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<String> {
        // Object names are generated, bare file names; anything else is a bug
        // in the caller.
        if name.is_empty() || name.contains('/') || name.contains("..") {
            return Err(Error::InvalidArgument(format!(
                "invalid object name: {}",
                name
            )));
        }
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(name);
        tokio::fs::write(&path, bytes).await?;
        debug!("stored {} bytes at {}", bytes.len(), path.display());
        Ok(format!("file://{}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_writes_bytes_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsObjectSink::new(dir.path());

        let url = sink.put("abc123.png", b"fake png").await.unwrap();
        assert!(url.starts_with("file://"));

        let stored = tokio::fs::read(dir.path().join("abc123.png")).await.unwrap();
        assert_eq!(stored, b"fake png");
    }

    #[tokio::test]
    async fn test_put_rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FsObjectSink::new(dir.path());

        assert!(sink.put("../escape.png", b"x").await.is_err());
        assert!(sink.put("a/b.png", b"x").await.is_err());
        assert!(sink.put("", b"x").await.is_err());
    }
}

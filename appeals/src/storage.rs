//! Attachment storage on the local filesystem.

use appeals_core::ports::AttachmentStore;
use appeals_core::{AppealsError, Result, TicketId};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Writes attachments under a root directory and serves them from a base URL.
///
/// Keys look like `tickets/<ticket>/<uuid>-<file name>`; the file name is
/// reduced to a safe character set first.
#[derive(Clone, Debug)]
pub struct LocalDiskStorage {
    root: PathBuf,
    public_url: String,
}

impl LocalDiskStorage {
    /// Storage rooted at `root`, served from `public_url`.
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn sanitize(file_name: &str) -> String {
    let cleaned: String = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

#[async_trait]
impl AttachmentStore for LocalDiskStorage {
    async fn put(&self, ticket_id: TicketId, file_name: &str, bytes: &[u8]) -> Result<String> {
        let key = format!("tickets/{ticket_id}/{}-{}", Uuid::new_v4(), sanitize(file_name));
        let path = self.root.join(&key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppealsError::Storage(format!("Failed to create attachment directory: {e}")))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppealsError::Storage(format!("Failed to write attachment: {e}")))?;

        tracing::debug!(ticket_id = %ticket_id, key = %key, size = bytes.len(), "Stored attachment");
        Ok(key)
    }

    fn url(&self, storage_key: &str) -> String {
        format!("{}/{storage_key}", self.public_url)
    }
}

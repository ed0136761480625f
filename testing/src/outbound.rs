//! Recording doubles for outbound collaborators.

use appeals_core::ports::{AttachmentStore, PushNotification, PushNotifier};
use appeals_core::{AppealsError, Result, TicketId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

/// Push notifier that records every notification it is asked to send.
#[derive(Clone, Debug, Default)]
pub struct RecordingPushNotifier {
    sent: Arc<Mutex<Vec<PushNotification>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingPushNotifier {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<PushNotification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make every following push fail.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(PoisonError::into_inner) = failing;
    }
}

#[async_trait]
impl PushNotifier for RecordingPushNotifier {
    async fn push(&self, notification: &PushNotification) -> Result<()> {
        if *self.failing.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(AppealsError::Internal("push provider unavailable".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification.clone());
        Ok(())
    }
}

/// Attachment store keeping bytes in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryAttachmentStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    rejected: Arc<Mutex<HashSet<String>>>,
}

impl MemoryAttachmentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail uploads of files with this name.
    #[must_use]
    pub fn rejecting(self, file_name: &str) -> Self {
        self.rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file_name.to_string());
        self
    }

    /// Stored bytes for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl AttachmentStore for MemoryAttachmentStore {
    async fn put(&self, ticket_id: TicketId, file_name: &str, bytes: &[u8]) -> Result<String> {
        if self
            .rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(file_name)
        {
            return Err(AppealsError::Storage(format!("upload of {file_name} rejected")));
        }

        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        let key = format!("tickets/{ticket_id}/{}-{file_name}", blobs.len() + 1);
        blobs.insert(key.clone(), bytes.to_vec());
        Ok(key)
    }

    fn url(&self, storage_key: &str) -> String {
        format!("memory://{storage_key}")
    }
}

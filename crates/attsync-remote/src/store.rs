//! [`IRemoteStore`] adapter over [`ConfluenceClient`]
//!
//! Attachments are keyed by their file name. Confluence does not report a
//! content digest, so listed records carry no fingerprint and a full listing
//! falls back to download-and-hash. Download links come from the listing and
//! are cached by id.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use attsync_core::domain::{AssetKey, RemoteAttachmentRecord, RemoteId};
use attsync_core::ports::{IRemoteStore, RemoteError};
use tracing::{debug, instrument, warn};

use crate::client::{Attachment, ConfluenceClient};

/// Confluence page attachments as an [`IRemoteStore`]
pub struct ConfluenceAttachmentStore {
    client: ConfluenceClient,
    download_links: Mutex<HashMap<RemoteId, String>>,
}

impl ConfluenceAttachmentStore {
    pub fn new(client: ConfluenceClient) -> Self {
        Self {
            client,
            download_links: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &ConfluenceClient {
        &self.client
    }

    fn links(&self) -> MutexGuard<'_, HashMap<RemoteId, String>> {
        self.download_links
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Convert an attachment to a record, caching its download link
    fn to_record(&self, attachment: Attachment) -> Result<RemoteAttachmentRecord, RemoteError> {
        let key = AssetKey::new(attachment.title.clone()).map_err(|e| {
            RemoteError::InvalidResponse(format!("attachment title {:?}: {e}", attachment.title))
        })?;
        let id = RemoteId::new(attachment.normalized_id())
            .map_err(|e| RemoteError::InvalidResponse(format!("attachment id: {e}")))?;

        if let Some(link) = attachment.links.download {
            self.links().insert(id.clone(), link);
        }

        Ok(RemoteAttachmentRecord {
            id,
            key,
            fingerprint: None,
            version: attachment.version.map(|v| v.number),
        })
    }

    fn cached_link(&self, id: &RemoteId) -> Option<String> {
        self.links().get(id).cloned()
    }
}

#[async_trait]
impl IRemoteStore for ConfluenceAttachmentStore {
    #[instrument(skip(self))]
    async fn list(&self) -> Result<Vec<RemoteAttachmentRecord>, RemoteError> {
        let attachments = self.client.list_attachments().await?;
        let mut records = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let title = attachment.title.clone();
            match self.to_record(attachment) {
                Ok(record) => records.push(record),
                Err(e) => warn!(title = %title, error = %e, "Skipping attachment"),
            }
        }
        Ok(records)
    }

    #[instrument(skip(self, data), fields(key = %key, size = data.len()))]
    async fn upload(
        &self,
        key: &AssetKey,
        data: Vec<u8>,
    ) -> Result<RemoteAttachmentRecord, RemoteError> {
        let attachment = self.client.upload_attachment(key.as_str(), data).await?;
        let mut record = self.to_record(attachment)?;
        // The server echoes the title it stored; the key we sent is canonical
        record.key = key.clone();
        Ok(record)
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn delete(&self, id: &RemoteId) -> Result<(), RemoteError> {
        self.client.delete_attachment(id.as_str()).await?;
        self.links().remove(id);
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn download(&self, id: &RemoteId) -> Result<Vec<u8>, RemoteError> {
        let link = match self.cached_link(id) {
            Some(link) => link,
            None => {
                debug!("Download link not cached, refreshing listing");
                self.list().await?;
                self.cached_link(id)
                    .ok_or_else(|| RemoteError::NotFound(format!("attachment {id}")))?
            }
        };
        self.client.download(&link).await
    }

    #[instrument(skip(self, body), fields(len = body.len()))]
    async fn publish_document(&self, title: &str, body: &str) -> Result<(), RemoteError> {
        let page = self.client.get_page().await?;
        if page.body == body && page.title == title {
            debug!(version = page.version, "Page already up to date");
            return Ok(());
        }
        self.client.update_page(title, body, page.version).await
    }
}

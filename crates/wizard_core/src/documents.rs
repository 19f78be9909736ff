use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{
        CategoryEntry, CategoryId, CategoryStatus, CategoryStatusMode, Document, DocumentId,
        FileStatus, UserId,
    },
    error::{TransportError, WizardError},
};
use storage::{save_json, StateStore};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{info, warn};

use crate::catalog;

/// Persistence namespace for per-category document state.
pub const DOCUMENT_STORE_NAMESPACE: &str = "document-store";

/// One file handed to the engine by the UI's file picker.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// The transport's success response. The document record is built from
/// this, never from the local file object, so the client cannot diverge
/// from the server on retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub document_id: DocumentId,
}

/// Opaque upload/delete collaborator. Implementations own retry and
/// timeout policy; the engine only sees success or a typed failure.
#[async_trait]
pub trait DocumentTransport: Send + Sync {
    async fn upload(
        &self,
        category_id: &CategoryId,
        upload: &DocumentUpload,
        user_id: &UserId,
    ) -> Result<UploadReceipt, TransportError>;

    async fn delete(&self, document_id: &DocumentId) -> Result<(), TransportError>;
}

pub struct MissingDocumentTransport;

#[async_trait]
impl DocumentTransport for MissingDocumentTransport {
    async fn upload(
        &self,
        category_id: &CategoryId,
        _upload: &DocumentUpload,
        _user_id: &UserId,
    ) -> Result<UploadReceipt, TransportError> {
        Err(TransportError::Transient(format!(
            "document transport unavailable for category {category_id}"
        )))
    }

    async fn delete(&self, document_id: &DocumentId) -> Result<(), TransportError> {
        Err(TransportError::Transient(format!(
            "document transport unavailable for document {document_id}"
        )))
    }
}

/// Cancellation handle for an in-flight multi-file upload: clone it,
/// hand one side to `upload_files`, and call [`CancelToken::cancel`]
/// when the user navigates away.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(tx),
        }
    }

    pub fn cancel(&self) {
        let _ = self.inner.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.borrow()
    }

    /// Resolves once [`Self::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate result of a multi-file upload. Partial failure is data,
/// not an error: the caller owns user notification.
#[derive(Debug, Default, Clone)]
pub struct UploadOutcome {
    pub any_success: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum DocumentEvent {
    CategoryUpdated {
        category_id: CategoryId,
    },
    StatusCycled {
        category_id: CategoryId,
        status: CategoryStatus,
    },
}

/// A catalog entry plus its mutable per-user state.
#[derive(Debug, Clone)]
pub struct CategoryRecord {
    pub entry: CategoryEntry,
    pub status_mode: CategoryStatusMode,
    /// Insertion order matches upload order; the UI file list must not
    /// visibly reorder between renders.
    pub documents: Vec<Document>,
}

impl CategoryRecord {
    fn from_entry(entry: CategoryEntry) -> Self {
        Self {
            entry,
            status_mode: CategoryStatusMode::Derived,
            documents: Vec::new(),
        }
    }

    /// Effective aggregate status: the manual override when one is
    /// pinned, otherwise derived from the document set.
    pub fn status(&self) -> CategoryStatus {
        match self.status_mode {
            CategoryStatusMode::Manual(status) => status,
            CategoryStatusMode::Derived => derive_status(&self.documents),
        }
    }
}

/// `error` beats `warning` beats `approved`; an empty category is
/// `none`.
pub fn derive_status(documents: &[Document]) -> CategoryStatus {
    if documents
        .iter()
        .any(|document| document.status == FileStatus::Rejected)
    {
        CategoryStatus::Error
    } else if documents
        .iter()
        .any(|document| document.status == FileStatus::Pending)
    {
        CategoryStatus::Warning
    } else if !documents.is_empty() {
        CategoryStatus::Approved
    } else {
        CategoryStatus::None
    }
}

/// Persisted layout: `{ id, uploadedFiles, status }` per category, where
/// `status` carries only a manual override (`null` means derived).
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedCategory {
    id: CategoryId,
    #[serde(default)]
    uploaded_files: Vec<Document>,
    #[serde(default)]
    status: Option<CategoryStatus>,
}

/// Owns the document catalog's derived status and the per-category
/// document lists, and performs upload/delete through the injected
/// transport.
pub struct DocumentCategoryEngine {
    transport: Arc<dyn DocumentTransport>,
    store: Arc<dyn StateStore>,
    user_id: UserId,
    state: Mutex<Vec<CategoryRecord>>,
    events: broadcast::Sender<DocumentEvent>,
}

impl DocumentCategoryEngine {
    /// Builds the live catalog and merges any persisted per-category
    /// state into it by id. Persisted records for ids absent from the
    /// catalog are dropped; the catalog is authoritative for everything
    /// but `uploadedFiles`/`status`.
    pub async fn initialize(
        transport: Arc<dyn DocumentTransport>,
        store: Arc<dyn StateStore>,
        user_id: UserId,
    ) -> Result<Arc<Self>> {
        let mut categories: Vec<CategoryRecord> = catalog::document_catalog()
            .into_iter()
            .map(CategoryRecord::from_entry)
            .collect();

        match store.load_raw(DOCUMENT_STORE_NAMESPACE).await? {
            Some(raw) => match serde_json::from_str::<Vec<PersistedCategory>>(&raw) {
                Ok(persisted) => merge_persisted(&mut categories, persisted),
                Err(err) => {
                    warn!("documents: discarding unreadable persisted state: {err}");
                }
            },
            None => {}
        }

        let (events, _) = broadcast::channel(256);
        Ok(Arc::new(Self {
            transport,
            store,
            user_id,
            state: Mutex::new(categories),
            events,
        }))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DocumentEvent> {
        self.events.subscribe()
    }

    /// Snapshot of every category for the grid UI, catalog order.
    pub async fn categories(&self) -> Vec<CategoryRecord> {
        self.state.lock().await.clone()
    }

    pub async fn category_status(&self, category_id: &CategoryId) -> Option<CategoryStatus> {
        self.state
            .lock()
            .await
            .iter()
            .find(|category| &category.entry.id == category_id)
            .map(CategoryRecord::status)
    }

    /// Pure read: the category's document list in upload order, empty
    /// for unknown ids.
    pub async fn get_documents_by_category(&self, category_id: &CategoryId) -> Vec<Document> {
        self.state
            .lock()
            .await
            .iter()
            .find(|category| &category.entry.id == category_id)
            .map(|category| category.documents.clone())
            .unwrap_or_default()
    }

    /// Uploads `uploads` one at a time so error attribution stays
    /// per-file and the resulting list order matches selection order.
    /// Per-file failures are collected, not raised; only an unknown
    /// category fails the whole call. Each transport call races the
    /// cancellation token; cancelling records one error for the
    /// interrupted file and skips the rest.
    pub async fn upload_files(
        &self,
        category_id: &CategoryId,
        uploads: Vec<DocumentUpload>,
        cancel: &CancelToken,
    ) -> Result<UploadOutcome, WizardError> {
        {
            let state = self.state.lock().await;
            if !state
                .iter()
                .any(|category| &category.entry.id == category_id)
            {
                return Err(WizardError::UnknownCategory(category_id.clone()));
            }
        }

        let mut outcome = UploadOutcome::default();
        for upload in &uploads {
            if cancel.is_cancelled() {
                outcome
                    .errors
                    .push(format!("{}: upload cancelled", upload.filename));
                break;
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    outcome
                        .errors
                        .push(format!("{}: upload cancelled", upload.filename));
                    break;
                }
                result = self.transport.upload(category_id, upload, &self.user_id) => result,
            };

            match result {
                Ok(receipt) => {
                    let document = Document {
                        id: receipt.document_id,
                        category_id: category_id.clone(),
                        original_filename: upload.filename.clone(),
                        file_size: upload.bytes.len() as u64,
                        mime_type: upload.mime_type.clone(),
                        status: FileStatus::Pending,
                        status_message: None,
                        uploaded_at: Utc::now(),
                    };
                    let mut state = self.state.lock().await;
                    if let Some(category) = state
                        .iter_mut()
                        .find(|category| &category.entry.id == category_id)
                    {
                        category.documents.push(document);
                    }
                    outcome.any_success = true;
                }
                Err(err) => {
                    warn!(
                        category_id = %category_id,
                        filename = %upload.filename,
                        "documents: upload failed: {err}"
                    );
                    outcome.errors.push(err.user_message(&upload.filename));
                }
            }
        }

        if outcome.any_success {
            info!(category_id = %category_id, "documents: uploads registered");
            self.persist().await;
            let _ = self.events.send(DocumentEvent::CategoryUpdated {
                category_id: category_id.clone(),
            });
        }
        Ok(outcome)
    }

    /// Removes the document only after the transport confirms the
    /// delete; a transport failure leaves local state untouched so the
    /// caller can re-attempt.
    pub async fn delete_document(&self, document_id: &DocumentId) -> Result<(), WizardError> {
        let category_id = {
            let state = self.state.lock().await;
            state
                .iter()
                .find(|category| {
                    category
                        .documents
                        .iter()
                        .any(|document| &document.id == document_id)
                })
                .map(|category| category.entry.id.clone())
                .ok_or_else(|| WizardError::DocumentNotFound(document_id.clone()))?
        };

        self.transport
            .delete(document_id)
            .await
            .map_err(WizardError::Transport)?;

        {
            let mut state = self.state.lock().await;
            if let Some(category) = state
                .iter_mut()
                .find(|category| category.entry.id == category_id)
            {
                category
                    .documents
                    .retain(|document| &document.id != document_id);
            }
        }

        info!(document_id = %document_id, category_id = %category_id, "documents: document deleted");
        self.persist().await;
        let _ = self
            .events
            .send(DocumentEvent::CategoryUpdated { category_id });
        Ok(())
    }

    /// Manual override: advances from the current effective status
    /// through none → approved → warning → error → none and pins the
    /// category to the result. Derivation resumes only after
    /// [`Self::clear_status_override`].
    pub async fn cycle_status(
        &self,
        category_id: &CategoryId,
    ) -> Result<CategoryStatus, WizardError> {
        let next = {
            let mut state = self.state.lock().await;
            let category = state
                .iter_mut()
                .find(|category| &category.entry.id == category_id)
                .ok_or_else(|| WizardError::UnknownCategory(category_id.clone()))?;
            let next = category.status().next_in_cycle();
            category.status_mode = CategoryStatusMode::Manual(next);
            next
        };

        self.persist().await;
        let _ = self.events.send(DocumentEvent::StatusCycled {
            category_id: category_id.clone(),
            status: next,
        });
        Ok(next)
    }

    /// Returns the category to document-derived status.
    pub async fn clear_status_override(
        &self,
        category_id: &CategoryId,
    ) -> Result<CategoryStatus, WizardError> {
        let status = {
            let mut state = self.state.lock().await;
            let category = state
                .iter_mut()
                .find(|category| &category.entry.id == category_id)
                .ok_or_else(|| WizardError::UnknownCategory(category_id.clone()))?;
            category.status_mode = CategoryStatusMode::Derived;
            category.status()
        };

        self.persist().await;
        let _ = self.events.send(DocumentEvent::CategoryUpdated {
            category_id: category_id.clone(),
        });
        Ok(status)
    }

    async fn persist(&self) {
        let persisted: Vec<PersistedCategory> = {
            let state = self.state.lock().await;
            state
                .iter()
                .map(|category| PersistedCategory {
                    id: category.entry.id.clone(),
                    uploaded_files: category.documents.clone(),
                    status: category.status_mode.manual_override(),
                })
                .collect()
        };

        if let Err(err) =
            save_json(self.store.as_ref(), DOCUMENT_STORE_NAMESPACE, &persisted).await
        {
            warn!("documents: failed to persist category state: {err:#}");
        }
    }
}

fn merge_persisted(categories: &mut [CategoryRecord], persisted: Vec<PersistedCategory>) {
    for record in persisted {
        match categories
            .iter_mut()
            .find(|category| category.entry.id == record.id)
        {
            Some(category) => {
                category.documents = record.uploaded_files;
                category.status_mode = record.status.into();
            }
            None => {
                warn!(
                    category_id = %record.id,
                    "documents: dropping persisted record for unknown category"
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/documents_tests.rs"]
mod tests;

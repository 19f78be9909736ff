//! Client-side state engine for a multi-step loan-application wizard:
//! wizard position and form data ([`ProgressStore`]), page ↔ URL ↔
//! section synchronization ([`PageSyncAdapter`]), and per-category
//! document status ([`DocumentCategoryEngine`]). Rendering, routing
//! chrome, and the HTTP transport are injected collaborators.

pub mod catalog;
pub mod documents;
pub mod page_sync;
pub mod progress;

pub use documents::{
    derive_status, CancelToken, CategoryRecord, DocumentCategoryEngine, DocumentEvent,
    DocumentTransport, DocumentUpload, MissingDocumentTransport, UploadOutcome, UploadReceipt,
    DOCUMENT_STORE_NAMESPACE,
};
pub use page_sync::{
    page_param, CompletionHandler, LocationProvider, NoopCompletionHandler, PageSyncAdapter,
    SurveyEngineHandle, SurveyEvent,
};
pub use progress::{
    Application, FormData, FormRecord, ProgressEvent, ProgressStore, PROGRESS_STORE_NAMESPACE,
};

use thiserror::Error;

use crate::domain::{CategoryId, DocumentId};

/// Fail-fast caller errors plus the transport wrapper. Partial upload
/// failure is deliberately absent: it is reported as data
/// (`UploadOutcome`), never raised.
#[derive(Debug, Error)]
pub enum WizardError {
    #[error("unknown application type '{0}'")]
    UnknownApplicationType(String),
    #[error("no application selected")]
    NoApplicationSelected,
    #[error("unknown document category '{0}'")]
    UnknownCategory(CategoryId),
    #[error("document '{0}' not found")]
    DocumentNotFound(DocumentId),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Typed failure from the upload/delete collaborator. Validation
/// failures carry a message shown verbatim to the user; transient
/// failures are replaced with a generic retry prompt.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("{0}")]
    Validation(String),
    #[error("transient transport failure: {0}")]
    Transient(String),
}

impl TransportError {
    /// The notification text for a per-file failure, keyed to the
    /// original filename.
    pub fn user_message(&self, filename: &str) -> String {
        match self {
            Self::Validation(message) => format!("{filename}: {message}"),
            Self::Transient(_) => {
                format!("{filename}: upload failed, please try again")
            }
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(ApplicationId);
id_newtype!(UserId);
id_newtype!(CategoryId);
id_newtype!(DocumentId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    Sba,
}

impl ApplicationType {
    /// Resolves the `{type}` path segment of an application route. The
    /// segment comes from untrusted URL input, so unknown values are a
    /// `None`, not a panic.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sba" => Some(Self::Sba),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sba => "sba",
        }
    }
}

/// One stepper-bar segment: a top-level grouping of wizard steps.
///
/// `progress` reflects "furthest reached", not "currently viewed": it is
/// non-decreasing across forward navigation and is never reset by moving
/// backward. `completed` is monotonic once true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub label: String,
    /// Positive; relative width of the stepper segment and the divisor
    /// for the progress fraction.
    pub step_count: u32,
    /// In `[0, 1]`.
    pub progress: f32,
    pub completed: bool,
}

impl Section {
    pub fn new(id: impl Into<String>, label: impl Into<String>, step_count: u32) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            step_count,
            progress: 0.0,
            completed: false,
        }
    }
}

/// Document-level review status. Independent namespace from
/// [`CategoryStatus`]: a `pending` file and a `warning` category are
/// related by derivation, not identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Approved,
    Rejected,
}

/// Aggregate review status of a document category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    None,
    Approved,
    Warning,
    Error,
}

impl CategoryStatus {
    /// The fixed manual-override cycle: none → approved → warning →
    /// error → none.
    pub fn next_in_cycle(self) -> Self {
        match self {
            Self::None => Self::Approved,
            Self::Approved => Self::Warning,
            Self::Warning => Self::Error,
            Self::Error => Self::None,
        }
    }
}

/// How a category's aggregate status is produced. Exactly one policy is
/// live per category: derived from its documents unless a reviewer has
/// pinned an explicit override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryStatusMode {
    Derived,
    Manual(CategoryStatus),
}

impl CategoryStatusMode {
    pub fn manual_override(&self) -> Option<CategoryStatus> {
        match self {
            Self::Derived => None,
            Self::Manual(status) => Some(*status),
        }
    }
}

impl From<Option<CategoryStatus>> for CategoryStatusMode {
    fn from(value: Option<CategoryStatus>) -> Self {
        match value {
            Some(status) => Self::Manual(status),
            None => Self::Derived,
        }
    }
}

/// One uploaded file, attached to exactly one category. Created only
/// from the transport's success response (server-assigned id); removed
/// on successful delete; otherwise immutable on the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub category_id: CategoryId,
    pub original_filename: String,
    pub file_size: u64,
    pub mime_type: Option<String>,
    pub status: FileStatus,
    #[serde(default)]
    pub status_message: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Read-only catalog row for a required-document type, shared across all
/// applications. Display fields carry no invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub id: CategoryId,
    pub title: String,
    pub subtitle: String,
    pub description: String,
}

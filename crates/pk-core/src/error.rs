use thiserror::Error;

use crate::model::Collection;

/// What had already taken effect remotely when a multi-step workflow failed.
///
/// The remote store offers no cross-document transaction, so a workflow that
/// fails between steps leaves the steps before the failure committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStage {
    /// Blob bytes were uploaded; no document references them yet (orphaned blob).
    BlobUploaded,
    /// Blob object was deleted; the embedded record still names it (dangling record).
    BlobDeleted,
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlobUploaded => f.write_str("blob upload"),
            Self::BlobDeleted => f.write_str("blob deletion"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PkError {
    /// A required input was missing or malformed. Raised before any remote
    /// call is issued, so no side effects exist.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Transient remote failure. Never retried automatically; surfaced to the
    /// caller to render.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A multi-step workflow failed after an earlier step had already taken
    /// effect remotely. The attachment consistency invariant may be violated
    /// until an out-of-band reconciliation pass runs.
    #[error("partial failure after {completed}: {source}")]
    PartialFailure {
        completed: WorkflowStage,
        #[source]
        source: Box<PkError>,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PkError {
    pub fn not_found(collection: Collection, id: &str) -> Self {
        Self::NotFound(format!("{collection}/{id}"))
    }

    pub fn partial(completed: WorkflowStage, source: PkError) -> Self {
        Self::PartialFailure {
            completed,
            source: Box::new(source),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type PkResult<T> = Result<T, PkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_collection_and_id() {
        let err = PkError::not_found(Collection::Leads, "abc");
        assert_eq!(err.to_string(), "not found: leads/abc");
        assert!(err.is_not_found());
    }

    #[test]
    fn partial_failure_carries_stage_and_source() {
        let err = PkError::partial(
            WorkflowStage::BlobUploaded,
            PkError::Unavailable("write timeout".into()),
        );
        let msg = err.to_string();
        assert!(msg.contains("blob upload"));
        match err {
            PkError::PartialFailure { completed, source } => {
                assert_eq!(completed, WorkflowStage::BlobUploaded);
                assert!(matches!(*source, PkError::Unavailable(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

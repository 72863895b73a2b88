//! Service Layer Error Types
//!
//! Errors surfaced by the deletion engine, the aggregation engine and
//! `PlanService`. Every variant names the node and, where relevant, the
//! operation, so callers can decide whether to retry.

use crate::db::{BlobError, StoreError};
use crate::models::ValidationError;
use thiserror::Error;

/// Failure from a collaborator outside this crate's control
#[derive(Error, Debug)]
pub enum ExternalError {
    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Blob(#[from] BlobError),
}

#[derive(Error, Debug)]
pub enum PlanServiceError {
    /// Referenced node or parent is absent for this owner
    #[error("Node not found: {id}")]
    NotFound { id: String },

    /// Duplicate id or sibling position collision on insert
    #[error("Conflict: {context}")]
    Conflict { context: String },

    /// A row delete failed part-way through a subtree
    ///
    /// `deleted` lists the rows removed before the failure; they stay deleted.
    #[error("Failed to delete node {node_id} ({} node(s) already deleted): {source}", .deleted.len())]
    Deletion {
        node_id: String,
        deleted: Vec<String>,
        #[source]
        source: StoreError,
    },

    /// Ancestor chain is inconsistent (too deep, or levels not increasing)
    #[error("Integrity violation at node {node_id} after {depth} step(s): {context}")]
    Integrity {
        node_id: String,
        depth: usize,
        context: String,
    },

    /// Store or media host call failed
    #[error("{operation} failed for {node_id}: {source}")]
    ExternalService {
        operation: &'static str,
        node_id: String,
        #[source]
        source: ExternalError,
    },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
}

impl PlanServiceError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn integrity(node_id: impl Into<String>, depth: usize, context: impl Into<String>) -> Self {
        Self::Integrity {
            node_id: node_id.into(),
            depth,
            context: context.into(),
        }
    }

    /// Wrap a store failure, keeping not-found and conflict as their own variants
    pub fn from_store(operation: &'static str, node_id: impl Into<String>, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => Self::NotFound { id },
            StoreError::Conflict { context } => Self::Conflict { context },
            other => Self::ExternalService {
                operation,
                node_id: node_id.into(),
                source: ExternalError::Store(other),
            },
        }
    }

    pub fn from_blob(operation: &'static str, node_id: impl Into<String>, err: BlobError) -> Self {
        Self::ExternalService {
            operation,
            node_id: node_id.into(),
            source: ExternalError::Blob(err),
        }
    }

    /// Node id carried by the error, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NotFound { id } => Some(id),
            Self::Deletion { node_id, .. }
            | Self::Integrity { node_id, .. }
            | Self::ExternalService { node_id, .. } => Some(node_id),
            Self::Conflict { .. } | Self::Validation(_) => None,
        }
    }
}

/// Attach operation context to store results
pub(crate) trait StoreResultExt<T> {
    fn context(self, operation: &'static str, node_id: &str) -> Result<T, PlanServiceError>;
}

impl<T> StoreResultExt<T> for Result<T, StoreError> {
    fn context(self, operation: &'static str, node_id: &str) -> Result<T, PlanServiceError> {
        self.map_err(|e| PlanServiceError::from_store(operation, node_id, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_keep_their_kind() {
        let err = PlanServiceError::from_store("get_node", "n1", StoreError::not_found("n1"));
        assert!(matches!(err, PlanServiceError::NotFound { ref id } if id == "n1"));

        let err = PlanServiceError::from_store("insert_node", "n1", StoreError::conflict("dup"));
        assert!(matches!(err, PlanServiceError::Conflict { .. }));

        let err = PlanServiceError::from_store(
            "update_fields",
            "n2",
            StoreError::backend(503, "unavailable"),
        );
        assert!(matches!(
            err,
            PlanServiceError::ExternalService { operation: "update_fields", .. }
        ));
        assert_eq!(err.node_id(), Some("n2"));
        assert!(err.to_string().contains("update_fields failed for n2"));
    }
}

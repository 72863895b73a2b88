//! Storage Error Types
//!
//! Error types for the tree store and blob store backends. Service-level
//! errors wrap these with the node id and operation that failed.

use thiserror::Error;

/// Tree store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Row addressed by id does not exist for this owner
    #[error("Node not found: {id}")]
    NotFound { id: String },

    /// Duplicate id or sibling position collision
    #[error("Conflict: {context}")]
    Conflict { context: String },

    /// Transport failure talking to the remote store
    #[error("Store request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote store answered with an unexpected status
    #[error("Store returned {status}: {body}")]
    Backend { status: u16, body: String },

    /// Row could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn conflict(context: impl Into<String>) -> Self {
        Self::Conflict {
            context: context.into(),
        }
    }

    pub fn backend(status: u16, body: impl Into<String>) -> Self {
        Self::Backend {
            status,
            body: body.into(),
        }
    }
}

/// Blob store operation errors
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Media host request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Media host refused to delete the blob
    #[error("Media host rejected {public_id}: {result}")]
    Rejected { public_id: String, result: String },

    #[error("Media host returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("Unknown blob: {public_id}")]
    NotFound { public_id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BlobError {
    pub fn rejected(public_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self::Rejected {
            public_id: public_id.into(),
            result: result.into(),
        }
    }

    pub fn backend(status: u16, body: impl Into<String>) -> Self {
        Self::Backend {
            status,
            body: body.into(),
        }
    }
}

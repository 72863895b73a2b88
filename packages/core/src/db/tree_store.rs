//! TreeStore Trait - Persistent Store Abstraction
//!
//! This module defines the `TreeStore` trait, the only path by which the rest
//! of the crate reads or writes plan rows. Backends translate these calls into
//! keyed and filtered operations against whatever holds the rows.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async; the production backend is a
//!    remote HTTP service.
//! 2. **Explicit owner**: Every call takes `owner_id`. There is no ambient
//!    "current user"; tenant isolation is part of the signature.
//! 3. **No cascade**: `delete_node` removes exactly one row. Subtree removal is
//!    synthesized by the deletion engine from `get_children` calls.
//! 4. **No transactions**: Each call is atomic per row and nothing more.
//!
//! # Examples
//!
//! ```rust
//! use lifeplan_core::db::{InMemoryTreeStore, TreeStore};
//! use lifeplan_core::models::{NewPlan, PlanNode};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), lifeplan_core::db::StoreError> {
//! let store: Arc<dyn TreeStore> = Arc::new(InMemoryTreeStore::new());
//!
//! let position = store.max_sibling_position("user-1", None).await? + 1;
//! let root = store
//!     .insert_node(PlanNode::new_root("user-1", NewPlan::titled("Career"), position))
//!     .await?;
//!
//! assert_eq!(root.position, 0);
//! assert!(store.get_node("user-2", &root.id).await?.is_none());
//! # Ok(())
//! # }
//! ```

use crate::db::StoreError;
use crate::models::{DeleteResult, NodeUpdate, PlanNode};
use async_trait::async_trait;

pub type StoreResult<T> = Result<T, StoreError>;

/// Abstraction layer for plan row persistence
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; services hold them as
/// `Arc<dyn TreeStore>` and call them from concurrent request tasks.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Get node by ID
    ///
    /// - `Ok(Some(node))` if the node exists for this owner
    /// - `Ok(None)` if it doesn't (not an error)
    async fn get_node(&self, owner_id: &str, id: &str) -> StoreResult<Option<PlanNode>>;

    /// Direct children of `parent_id`, ordered by `position` ascending
    ///
    /// `None` returns the owner's root plans.
    async fn get_children(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> StoreResult<Vec<PlanNode>>;

    /// Insert a new row
    ///
    /// # Errors
    ///
    /// `StoreError::Conflict` if the id already exists or another sibling of the
    /// same owner and parent already holds `node.position`.
    async fn insert_node(&self, node: PlanNode) -> StoreResult<PlanNode>;

    /// Partially update a row and return the full updated node
    ///
    /// Fields left as `None` in `update` are untouched.
    ///
    /// # Errors
    ///
    /// `StoreError::NotFound` if the node does not exist for this owner.
    async fn update_fields(
        &self,
        owner_id: &str,
        id: &str,
        update: NodeUpdate,
    ) -> StoreResult<PlanNode>;

    /// Delete exactly one row; does not cascade
    ///
    /// Deleting a missing row succeeds with `existed: false`.
    async fn delete_node(&self, owner_id: &str, id: &str) -> StoreResult<DeleteResult>;

    /// Largest `position` among the direct children of `parent_id`, or `-1`
    async fn max_sibling_position(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> StoreResult<i64>;
}

//! Subtree Deletion Engine
//!
//! Removes a node, every descendant, and all media those nodes own. The tree
//! store has no recursive delete, so the subtree is enumerated here with an
//! explicit worklist (stack depth does not grow with tree depth) and then
//! deleted row by row.
//!
//! # Ordering
//!
//! 1. The whole subtree is enumerated breadth-first **before** the first
//!    delete, so removing a parent can never hide its children.
//! 2. Rows are deleted in reverse enumeration order (deepest first). If a
//!    delete fails, everything still in the store remains a connected subtree.
//! 3. A node's media is released before its row is deleted.
//!
//! # Failure semantics
//!
//! - Media release is best-effort: failures are logged and reported, never
//!   fatal.
//! - A failed row delete stops the run with [`PlanServiceError::Deletion`].
//!   Rows deleted before that stay deleted; there is no rollback.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::db::{BlobStore, TreeStore};
use crate::models::PlanNode;
use crate::services::error::{PlanServiceError, StoreResultExt};

/// What a subtree deletion did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionReport {
    pub root_id: String,
    /// Rows removed, in deletion order
    pub deleted: Vec<String>,
    /// Public ids whose release succeeded
    pub released_media: Vec<String>,
    /// Public ids whose release failed (left orphaned on the media host)
    pub failed_media: Vec<String>,
}

#[derive(Clone)]
pub struct SubtreeDeletionEngine {
    store: Arc<dyn TreeStore>,
    blobs: Arc<dyn BlobStore>,
}

impl SubtreeDeletionEngine {
    pub fn new(store: Arc<dyn TreeStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    /// The node and all of its descendants, breadth-first from `root_id`
    ///
    /// Ids seen twice (only possible with corrupted parent links) are expanded
    /// once, so the walk always terminates.
    pub async fn collect_subtree(
        &self,
        owner_id: &str,
        root_id: &str,
    ) -> Result<Vec<PlanNode>, PlanServiceError> {
        let root = self
            .store
            .get_node(owner_id, root_id)
            .await
            .context("get_node", root_id)?
            .ok_or_else(|| PlanServiceError::not_found(root_id))?;

        let mut seen = HashSet::from([root.id.clone()]);
        let mut queue = VecDeque::from([root.id.clone()]);
        let mut nodes = vec![root];

        while let Some(id) = queue.pop_front() {
            let children = self
                .store
                .get_children(owner_id, Some(&id))
                .await
                .context("get_children", &id)?;

            for child in children {
                if seen.insert(child.id.clone()) {
                    queue.push_back(child.id.clone());
                    nodes.push(child);
                } else {
                    warn!("Node {} reached twice while walking subtree of {}", child.id, root_id);
                }
            }
        }

        debug!("Subtree of {} has {} node(s)", root_id, nodes.len());
        Ok(nodes)
    }

    /// Delete `root_id`, its descendants and their media
    #[instrument(skip(self))]
    pub async fn delete_subtree(
        &self,
        owner_id: &str,
        root_id: &str,
    ) -> Result<DeletionReport, PlanServiceError> {
        let nodes = self.collect_subtree(owner_id, root_id).await?;

        let mut report = DeletionReport {
            root_id: root_id.to_string(),
            ..Default::default()
        };
        let mut released = HashSet::new();

        for node in nodes.iter().rev() {
            for media in node.media_refs() {
                if !released.insert(media.public_id.clone()) {
                    continue;
                }
                match self.blobs.delete(&media.public_id).await {
                    Ok(()) => report.released_media.push(media.public_id),
                    Err(e) => {
                        warn!(
                            "Failed to release media {} of node {}: {}",
                            media.public_id, node.id, e
                        );
                        report.failed_media.push(media.public_id);
                    }
                }
            }

            match self.store.delete_node(owner_id, &node.id).await {
                Ok(result) if result.existed => report.deleted.push(node.id.clone()),
                Ok(_) => debug!("Node {} was already gone", node.id),
                Err(source) => {
                    return Err(PlanServiceError::Deletion {
                        node_id: node.id.clone(),
                        deleted: report.deleted,
                        source,
                    });
                }
            }
        }

        info!(
            "Deleted subtree {} ({} node(s), {} media released, {} media failed)",
            root_id,
            report.deleted.len(),
            report.released_media.len(),
            report.failed_media.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryBlobStore, InMemoryTreeStore};
    use crate::models::{MediaRef, NewPlan};

    async fn insert(store: &InMemoryTreeStore, node: PlanNode) -> PlanNode {
        store.insert_node(node).await.unwrap()
    }

    #[tokio::test]
    async fn test_collect_is_breadth_first() {
        let store = Arc::new(InMemoryTreeStore::new());
        let root = insert(&store, PlanNode::new_root("o", NewPlan::titled("R"), 0)).await;
        let a = insert(&store, PlanNode::new_child(&root, NewPlan::titled("A"), 0)).await;
        let b = insert(&store, PlanNode::new_child(&root, NewPlan::titled("B"), 1)).await;
        let a1 = insert(&store, PlanNode::new_child(&a, NewPlan::titled("A1"), 0)).await;

        let engine = SubtreeDeletionEngine::new(store.clone(), Arc::new(InMemoryBlobStore::new()));
        let ids: Vec<String> = engine
            .collect_subtree("o", &root.id)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();

        assert_eq!(ids, vec![root.id, a.id, b.id, a1.id]);
    }

    #[tokio::test]
    async fn test_delete_leaves_deepest_first() {
        let store = Arc::new(InMemoryTreeStore::new());
        let root = insert(&store, PlanNode::new_root("o", NewPlan::titled("R"), 0)).await;
        let a = insert(&store, PlanNode::new_child(&root, NewPlan::titled("A"), 0)).await;
        let a1 = insert(&store, PlanNode::new_child(&a, NewPlan::titled("A1"), 0)).await;

        let engine = SubtreeDeletionEngine::new(store.clone(), Arc::new(InMemoryBlobStore::new()));
        let report = engine.delete_subtree("o", &root.id).await.unwrap();

        assert_eq!(report.deleted, vec![a1.id, a.id, root.id]);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_shared_media_released_once() {
        let store = Arc::new(InMemoryTreeStore::new());
        let blobs = Arc::new(InMemoryBlobStore::new());
        let cover = MediaRef::new("plans/o/shared", "https://cdn/shared.jpg");

        let mut plan = NewPlan::titled("R");
        plan.photo = Some(cover.clone());
        let root = insert(&store, PlanNode::new_root("o", plan, 0)).await;
        let mut child_plan = NewPlan::titled("A");
        child_plan.photo = Some(cover);
        insert(&store, PlanNode::new_child(&root, child_plan, 0)).await;

        let engine = SubtreeDeletionEngine::new(store.clone(), blobs.clone());
        let report = engine.delete_subtree("o", &root.id).await.unwrap();

        assert_eq!(blobs.deleted().await, vec!["plans/o/shared".to_string()]);
        assert_eq!(report.released_media.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_root_is_not_found() {
        let engine = SubtreeDeletionEngine::new(
            Arc::new(InMemoryTreeStore::new()),
            Arc::new(InMemoryBlobStore::new()),
        );
        let err = engine.delete_subtree("o", "nope").await.unwrap_err();
        assert!(matches!(err, PlanServiceError::NotFound { ref id } if id == "nope"));
    }
}

//! In-memory TreeStore backend
//!
//! Holds all rows in a `HashMap` behind a tokio `RwLock`. Enforces the same
//! constraints the remote table does (unique id, unique sibling position on
//! insert) so engines behave identically against both backends. Used by tests,
//! benchmarks and the server's `--in-memory` mode.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::db::tree_store::{StoreResult, TreeStore};
use crate::db::StoreError;
use crate::models::{DeleteResult, NodeUpdate, PlanNode};

#[derive(Debug, Default)]
pub struct InMemoryTreeStore {
    nodes: RwLock<HashMap<String, PlanNode>>,
}

impl InMemoryTreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows across all owners
    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }
}

fn is_sibling(node: &PlanNode, owner_id: &str, parent_id: Option<&str>) -> bool {
    node.owner_id == owner_id && node.parent_id.as_deref() == parent_id
}

#[async_trait]
impl TreeStore for InMemoryTreeStore {
    async fn get_node(&self, owner_id: &str, id: &str) -> StoreResult<Option<PlanNode>> {
        let nodes = self.nodes.read().await;
        Ok(nodes.get(id).filter(|n| n.owner_id == owner_id).cloned())
    }

    async fn get_children(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> StoreResult<Vec<PlanNode>> {
        let nodes = self.nodes.read().await;
        let mut children: Vec<PlanNode> = nodes
            .values()
            .filter(|n| is_sibling(n, owner_id, parent_id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        Ok(children)
    }

    async fn insert_node(&self, node: PlanNode) -> StoreResult<PlanNode> {
        let mut nodes = self.nodes.write().await;

        if nodes.contains_key(&node.id) {
            return Err(StoreError::conflict(format!(
                "node {} already exists",
                node.id
            )));
        }

        let parent_id = node.parent_id.as_deref();
        if nodes
            .values()
            .any(|n| is_sibling(n, &node.owner_id, parent_id) && n.position == node.position)
        {
            return Err(StoreError::conflict(format!(
                "position {} already taken under parent {}",
                node.position,
                parent_id.unwrap_or("<root>")
            )));
        }

        nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    async fn update_fields(
        &self,
        owner_id: &str,
        id: &str,
        update: NodeUpdate,
    ) -> StoreResult<PlanNode> {
        let mut nodes = self.nodes.write().await;
        let node = nodes
            .get_mut(id)
            .filter(|n| n.owner_id == owner_id)
            .ok_or_else(|| StoreError::not_found(id))?;

        node.apply(update);
        Ok(node.clone())
    }

    async fn delete_node(&self, owner_id: &str, id: &str) -> StoreResult<DeleteResult> {
        let mut nodes = self.nodes.write().await;
        let owned = nodes.get(id).is_some_and(|n| n.owner_id == owner_id);
        if owned {
            nodes.remove(id);
        }
        Ok(DeleteResult { existed: owned })
    }

    async fn max_sibling_position(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> StoreResult<i64> {
        let nodes = self.nodes.read().await;
        Ok(nodes
            .values()
            .filter(|n| is_sibling(n, owner_id, parent_id))
            .map(|n| n.position)
            .max()
            .unwrap_or(-1))
    }
}

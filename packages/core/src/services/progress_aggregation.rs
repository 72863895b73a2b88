//! Progress Aggregation Engine
//!
//! A parent's progress is the floor of the unweighted mean of its direct
//! children's progress. After a node's progress changes, every ancestor is
//! recomputed in turn, nearest first, until a root is reached.
//!
//! Nothing is cached between steps: each step re-reads the parent and all of
//! its children from the store, so concurrent sibling updates resolve as
//! last-writer-wins on whichever read-then-write finishes last.
//!
//! # Integrity checks
//!
//! `parent_id` is immutable, so the ancestor chain is acyclic by construction.
//! Corrupted rows are still caught:
//!
//! - more than `level + MAX_DEPTH_MARGIN` steps fails with
//!   [`PlanServiceError::Integrity`]
//! - a parent whose `level` is not below its child's fails the same way

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::db::TreeStore;
use crate::models::{NodeUpdate, PlanNode};
use crate::services::error::{PlanServiceError, StoreResultExt};

/// Extra steps allowed beyond the starting node's level
pub const MAX_DEPTH_MARGIN: usize = 16;

/// Floor mean of the children's progress, `None` for no children
pub fn average_progress(children: &[PlanNode]) -> Option<u8> {
    if children.is_empty() {
        return None;
    }
    let sum: u64 = children.iter().map(|c| u64::from(c.progress)).sum();
    // Mean of values <= 100 is <= 100
    Some((sum / children.len() as u64) as u8)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressChange {
    pub node_id: String,
    pub progress: u8,
}

/// Writes performed by one aggregation run, in write order (root last)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregationReport {
    pub updates: Vec<ProgressChange>,
}

impl AggregationReport {
    /// Progress written to `node_id`, if this run touched it
    pub fn progress_of(&self, node_id: &str) -> Option<u8> {
        self.updates
            .iter()
            .rev()
            .find(|c| c.node_id == node_id)
            .map(|c| c.progress)
    }
}

#[derive(Clone)]
pub struct ProgressAggregationEngine {
    store: Arc<dyn TreeStore>,
}

impl ProgressAggregationEngine {
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self { store }
    }

    /// Recompute every ancestor of `node_id`
    ///
    /// The node itself is not written. A root yields an empty report.
    #[instrument(skip(self))]
    pub async fn propagate_from(
        &self,
        owner_id: &str,
        node_id: &str,
    ) -> Result<AggregationReport, PlanServiceError> {
        let node = self.load(owner_id, node_id).await?;
        let mut report = AggregationReport::default();
        self.propagate(owner_id, node, &mut report).await?;
        Ok(report)
    }

    /// Recompute `node_id` from its current children, then its ancestors
    ///
    /// Used after the set of children changed (a child subtree was deleted).
    /// A node with no children left keeps its stored progress, and since it
    /// did not change its ancestors are left alone too.
    #[instrument(skip(self))]
    pub async fn recompute_from(
        &self,
        owner_id: &str,
        node_id: &str,
    ) -> Result<AggregationReport, PlanServiceError> {
        let node = self.load(owner_id, node_id).await?;
        let children = self
            .store
            .get_children(owner_id, Some(&node.id))
            .await
            .context("get_children", &node.id)?;

        let mut report = AggregationReport::default();
        let Some(progress) = average_progress(&children) else {
            debug!("Node {} has no children left, keeping progress {}", node.id, node.progress);
            return Ok(report);
        };

        let updated = self.write(owner_id, &node.id, progress, &mut report).await?;
        self.propagate(owner_id, updated, &mut report).await?;
        Ok(report)
    }

    async fn load(&self, owner_id: &str, node_id: &str) -> Result<PlanNode, PlanServiceError> {
        self.store
            .get_node(owner_id, node_id)
            .await
            .context("get_node", node_id)?
            .ok_or_else(|| PlanServiceError::not_found(node_id))
    }

    async fn write(
        &self,
        owner_id: &str,
        node_id: &str,
        progress: u8,
        report: &mut AggregationReport,
    ) -> Result<PlanNode, PlanServiceError> {
        let updated = self
            .store
            .update_fields(owner_id, node_id, NodeUpdate::progress(progress))
            .await
            .context("update_fields", node_id)?;
        report.updates.push(ProgressChange {
            node_id: node_id.to_string(),
            progress,
        });
        Ok(updated)
    }

    async fn propagate(
        &self,
        owner_id: &str,
        start: PlanNode,
        report: &mut AggregationReport,
    ) -> Result<(), PlanServiceError> {
        let max_depth = start.level as usize + MAX_DEPTH_MARGIN;
        let mut current = start;
        let mut depth = 0;

        while let Some(parent_id) = current.parent_id.clone() {
            depth += 1;
            if depth > max_depth {
                return Err(PlanServiceError::integrity(
                    &current.id,
                    depth,
                    format!("ancestor chain longer than {} steps", max_depth),
                ));
            }

            let parent = self.load(owner_id, &parent_id).await?;
            if parent.level >= current.level {
                return Err(PlanServiceError::integrity(
                    &parent.id,
                    depth,
                    format!(
                        "parent level {} is not below child {} level {}",
                        parent.level, current.id, current.level
                    ),
                ));
            }

            let children = self
                .store
                .get_children(owner_id, Some(&parent.id))
                .await
                .context("get_children", &parent.id)?;

            // The child that triggered this step should be among them
            let progress = average_progress(&children).ok_or_else(|| {
                PlanServiceError::integrity(
                    &parent.id,
                    depth,
                    format!("no children listed although {} references it", current.id),
                )
            })?;

            debug!(
                "Parent {} of {} -> {} from {} child(ren)",
                parent.id,
                current.id,
                progress,
                children.len()
            );
            current = self.write(owner_id, &parent.id, progress, report).await?;
        }

        if !report.updates.is_empty() {
            info!("Aggregated progress across {} ancestor(s)", report.updates.len());
        }
        Ok(())
    }
}

//! Plan Service - Request-Facing Operations
//!
//! This module is the entry point request handlers call. It combines the tree
//! store, the blob store and both engines:
//!
//! - CRUD for root plans and sub-plans
//! - Progress updates with upward aggregation
//! - Content block editing (text, gallery, checklist, sub-plan link)
//! - Sibling reordering
//! - Subtree deletion followed by re-aggregation of the former parent
//! - Media upload and release
//! - XP grants for completed checklist tasks
//!
//! # Media ownership
//!
//! Whenever an edit drops a media reference (replaced cover, removed gallery
//! image, removed content item), the dropped blob is released best-effort
//! after the row write succeeds. A failed release is logged and never fails
//! the edit.
//!
//! # Hierarchy
//!
//! There is no reparent operation. `parent_id` and `level` are fixed when a
//! node is created, which keeps every ancestor chain finite and acyclic.
//!
//! Progress is only set by hand on leaves. A plan with sub-plans always holds
//! the floor mean of its children, so manual writes to it are rejected.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::db::{
    owner_folder, plan_folder, BlobStore, InMemoryXpStore, TreeStore, UploadRequest,
    UploadedBlob, XpStore,
};
use crate::models::{
    validate_progress, ContentBlock, ContentItem, MediaRef, NewPlan, NodeUpdate, PlanNode,
    PlanPatch, PositionUpdate, ValidationError, XpGrant, XpSummary,
};
use crate::services::error::{PlanServiceError, StoreResultExt};
use crate::services::progress_aggregation::{ProgressAggregationEngine, ProgressChange};
use crate::services::subtree_deletion::{DeletionReport, SubtreeDeletionEngine};

/// Default root folder for uploaded media
pub const DEFAULT_UPLOAD_FOLDER: &str = "plans";

/// A node after a progress write, plus the ancestors recomputed from it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressOutcome {
    pub plan: PlanNode,
    pub ancestors: Vec<ProgressChange>,
}

/// Result of deleting a plan and its subtree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDeletion {
    #[serde(flatten)]
    pub report: DeletionReport,
    /// Former parent and its ancestors, recomputed after the removal
    pub ancestors: Vec<ProgressChange>,
}

/// Media in `before` that no longer appears in `after`
fn dropped_media(before: &[MediaRef], after: &[MediaRef]) -> Vec<MediaRef> {
    let kept: HashSet<&str> = after.iter().map(|m| m.public_id.as_str()).collect();
    let mut seen = HashSet::new();
    before
        .iter()
        .filter(|m| !kept.contains(m.public_id.as_str()))
        .filter(|m| seen.insert(m.public_id.clone()))
        .cloned()
        .collect()
}

fn find_item(node: &PlanNode, content_id: &str) -> Result<usize, ValidationError> {
    node.content
        .iter()
        .position(|item| item.id == content_id)
        .ok_or_else(|| ValidationError::UnknownContentItem(content_id.to_string()))
}

/// Plan operations scoped by owner
///
/// # Examples
///
/// ```rust
/// use lifeplan_core::db::{InMemoryBlobStore, InMemoryTreeStore};
/// use lifeplan_core::models::NewPlan;
/// use lifeplan_core::services::PlanService;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), lifeplan_core::services::PlanServiceError> {
/// let service = PlanService::new(
///     Arc::new(InMemoryTreeStore::new()),
///     Arc::new(InMemoryBlobStore::new()),
/// );
///
/// let root = service.create_plan("user-1", NewPlan::titled("Health")).await?;
/// service
///     .create_child("user-1", &root.id, NewPlan::titled("Sleep").with_progress(40))
///     .await?;
/// service
///     .create_child("user-1", &root.id, NewPlan::titled("Diet").with_progress(60))
///     .await?;
///
/// assert_eq!(service.get_plan("user-1", &root.id).await?.progress, 50);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PlanService {
    store: Arc<dyn TreeStore>,
    blobs: Arc<dyn BlobStore>,
    deletion: SubtreeDeletionEngine,
    aggregation: ProgressAggregationEngine,
    xp: Arc<dyn XpStore>,
    upload_folder: String,
}

impl PlanService {
    pub fn new(store: Arc<dyn TreeStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            deletion: SubtreeDeletionEngine::new(store.clone(), blobs.clone()),
            aggregation: ProgressAggregationEngine::new(store.clone()),
            store,
            blobs,
            xp: Arc::new(InMemoryXpStore::new()),
            upload_folder: DEFAULT_UPLOAD_FOLDER.to_string(),
        }
    }

    /// XP ledger credited when checklist tasks are completed
    ///
    /// Defaults to an in-memory ledger.
    pub fn with_xp_store(mut self, xp: Arc<dyn XpStore>) -> Self {
        self.xp = xp;
        self
    }

    /// Root folder under which uploads are grouped by owner and plan
    pub fn with_upload_folder(mut self, folder: impl Into<String>) -> Self {
        self.upload_folder = folder.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn TreeStore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_plan(&self, owner_id: &str, id: &str) -> Result<PlanNode, PlanServiceError> {
        self.store
            .get_node(owner_id, id)
            .await
            .context("get_node", id)?
            .ok_or_else(|| PlanServiceError::not_found(id))
    }

    /// The owner's root plans, by position
    pub async fn list_plans(&self, owner_id: &str) -> Result<Vec<PlanNode>, PlanServiceError> {
        self.store
            .get_children(owner_id, None)
            .await
            .context("get_children", "<root>")
    }

    /// Direct sub-plans of `parent_id`, by position
    pub async fn list_children(
        &self,
        owner_id: &str,
        parent_id: &str,
    ) -> Result<Vec<PlanNode>, PlanServiceError> {
        let parent = self.get_plan(owner_id, parent_id).await?;
        self.store
            .get_children(owner_id, Some(&parent.id))
            .await
            .context("get_children", parent_id)
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create a root plan at the end of the owner's list
    #[instrument(skip(self, plan))]
    pub async fn create_plan(
        &self,
        owner_id: &str,
        plan: NewPlan,
    ) -> Result<PlanNode, PlanServiceError> {
        plan.validate()?;
        let position = self
            .store
            .max_sibling_position(owner_id, None)
            .await
            .context("max_sibling_position", "<root>")?
            + 1;

        let node = PlanNode::new_root(owner_id, plan, position);
        node.validate()?;
        let node = self
            .store
            .insert_node(node)
            .await
            .context("insert_node", "<root>")?;

        info!("Created plan {} at position {}", node.id, node.position);
        Ok(node)
    }

    /// Create a sub-plan under `parent_id` and re-aggregate its ancestors
    #[instrument(skip(self, plan))]
    pub async fn create_child(
        &self,
        owner_id: &str,
        parent_id: &str,
        plan: NewPlan,
    ) -> Result<PlanNode, PlanServiceError> {
        plan.validate()?;
        let parent = self.get_plan(owner_id, parent_id).await?;
        let position = self
            .store
            .max_sibling_position(owner_id, Some(&parent.id))
            .await
            .context("max_sibling_position", parent_id)?
            + 1;

        let node = PlanNode::new_child(&parent, plan, position);
        node.validate()?;
        let node = self
            .store
            .insert_node(node)
            .await
            .context("insert_node", parent_id)?;

        info!(
            "Created sub-plan {} under {} (level {}, position {})",
            node.id, parent.id, node.level, node.position
        );
        self.aggregation.propagate_from(owner_id, &node.id).await?;
        Ok(node)
    }

    // ------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------

    /// Apply a partial update
    ///
    /// Media the update drops is released; a progress change is aggregated.
    /// Setting `progress` on a plan with sub-plans is rejected before any write.
    #[instrument(skip(self, patch))]
    pub async fn update_plan(
        &self,
        owner_id: &str,
        id: &str,
        patch: PlanPatch,
    ) -> Result<PlanNode, PlanServiceError> {
        let update = patch.into_update()?;
        let before = self.get_plan(owner_id, id).await?;
        if update.is_empty() {
            return Ok(before);
        }
        if update.progress.is_some() {
            self.ensure_leaf(owner_id, id).await?;
        }

        let progress_changed = update.progress.is_some();
        let after = self.write(owner_id, id, update).await?;
        self.release_dropped(&before, &after).await;

        if progress_changed {
            self.aggregation.propagate_from(owner_id, id).await?;
        }
        Ok(after)
    }

    /// Set a leaf's progress and recompute its ancestors
    #[instrument(skip(self))]
    pub async fn set_progress(
        &self,
        owner_id: &str,
        id: &str,
        progress: i64,
    ) -> Result<ProgressOutcome, PlanServiceError> {
        let progress = validate_progress(progress)?;
        self.ensure_leaf(owner_id, id).await?;
        let plan = self.write(owner_id, id, NodeUpdate::progress(progress)).await?;
        let report = self.aggregation.propagate_from(owner_id, id).await?;

        Ok(ProgressOutcome {
            plan,
            ancestors: report.updates,
        })
    }

    /// Reassign positions of direct children of `parent_id` (`None` for roots)
    ///
    /// Every entry must name a distinct current direct child and a distinct
    /// non-negative position; otherwise nothing is written. If a write fails
    /// part-way, the moved rows are put back on their previous positions
    /// before the error is returned.
    #[instrument(skip(self, updates))]
    pub async fn reorder_children(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
        updates: Vec<PositionUpdate>,
    ) -> Result<Vec<PlanNode>, PlanServiceError> {
        if let Some(parent_id) = parent_id {
            self.get_plan(owner_id, parent_id).await?;
        }
        let label = parent_id.unwrap_or("<root>");

        let children = self
            .store
            .get_children(owner_id, parent_id)
            .await
            .context("get_children", label)?;
        let previous: HashMap<&str, i64> = children
            .iter()
            .map(|c| (c.id.as_str(), c.position))
            .collect();

        let mut ids = HashSet::new();
        let mut targets = HashSet::new();
        for entry in &updates {
            if !previous.contains_key(entry.id.as_str()) {
                return Err(ValidationError::InvalidParent(format!(
                    "{} is not a direct child of {}",
                    entry.id, label
                ))
                .into());
            }
            if !ids.insert(entry.id.as_str()) {
                return Err(ValidationError::DuplicateReorderEntry(entry.id.clone()).into());
            }
            if entry.position < 0 {
                return Err(ValidationError::NegativePosition(entry.position).into());
            }
            if !targets.insert(entry.position) {
                return Err(ValidationError::DuplicatePosition(entry.position).into());
            }
        }

        if let Err(err) = self.write_positions(owner_id, &updates, false).await {
            warn!("Reorder under {} failed, restoring positions: {}", label, err);
            let restore: Vec<PositionUpdate> = updates
                .iter()
                .filter_map(|entry| {
                    previous.get(entry.id.as_str()).map(|&position| PositionUpdate {
                        id: entry.id.clone(),
                        position,
                    })
                })
                .collect();
            if self.write_positions(owner_id, &restore, true).await.is_err() {
                warn!("Positions under {} were only partly restored", label);
            }
            return Err(err);
        }
        debug!("Reordered {} child(ren) of {}", updates.len(), label);

        self.store
            .get_children(owner_id, parent_id)
            .await
            .context("get_children", label)
    }

    // ------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------

    /// Replace the whole content list
    pub async fn replace_content(
        &self,
        owner_id: &str,
        id: &str,
        content: Vec<ContentItem>,
    ) -> Result<PlanNode, PlanServiceError> {
        let before = self.get_plan(owner_id, id).await?;
        let after = self.write(owner_id, id, NodeUpdate::content(content)).await?;
        self.release_dropped(&before, &after).await;
        Ok(after)
    }

    /// Append a content block
    pub async fn add_content_item(
        &self,
        owner_id: &str,
        id: &str,
        item: ContentItem,
    ) -> Result<PlanNode, PlanServiceError> {
        let mut content = self.get_plan(owner_id, id).await?.content;
        content.push(item);
        self.write(owner_id, id, NodeUpdate::content(content)).await
    }

    /// Replace the block of one content item, keeping its id and timestamp
    pub async fn update_content_item(
        &self,
        owner_id: &str,
        id: &str,
        content_id: &str,
        block: ContentBlock,
    ) -> Result<PlanNode, PlanServiceError> {
        let before = self.get_plan(owner_id, id).await?;
        let index = find_item(&before, content_id)?;

        let mut content = before.content.clone();
        content[index].block = block;

        let after = self.write(owner_id, id, NodeUpdate::content(content)).await?;
        self.release_dropped(&before, &after).await;
        Ok(after)
    }

    /// Remove one content item and release its media
    pub async fn remove_content_item(
        &self,
        owner_id: &str,
        id: &str,
        content_id: &str,
    ) -> Result<PlanNode, PlanServiceError> {
        let before = self.get_plan(owner_id, id).await?;
        let index = find_item(&before, content_id)?;

        let mut content = before.content.clone();
        content.remove(index);

        let after = self.write(owner_id, id, NodeUpdate::content(content)).await?;
        self.release_dropped(&before, &after).await;
        Ok(after)
    }

    /// Tick or untick one task of a checklist block
    ///
    /// Ticking a task that was open grants XP; re-ticking a done task does not.
    pub async fn set_checklist_task(
        &self,
        owner_id: &str,
        id: &str,
        content_id: &str,
        task_index: usize,
        completed: bool,
    ) -> Result<PlanNode, PlanServiceError> {
        let mut content = self.get_plan(owner_id, id).await?.content;
        let index = content
            .iter()
            .position(|item| item.id == content_id)
            .ok_or_else(|| ValidationError::UnknownContentItem(content_id.to_string()))?;

        let newly_completed = match &mut content[index].block {
            ContentBlock::Checklist { tasks } => {
                let task = tasks.get_mut(task_index).ok_or_else(|| {
                    ValidationError::TaskIndexOutOfRange {
                        content_id: content_id.to_string(),
                        index: task_index,
                    }
                })?;
                let was_completed = std::mem::replace(&mut task.completed, completed);
                completed && !was_completed
            }
            _ => return Err(ValidationError::NotAChecklist(content_id.to_string()).into()),
        };

        let plan = self.write(owner_id, id, NodeUpdate::content(content)).await?;
        if newly_completed {
            self.grant(XpGrant::task_completed(owner_id)).await;
        }
        Ok(plan)
    }

    // ------------------------------------------------------------------
    // Experience
    // ------------------------------------------------------------------

    /// The owner's XP total, level and achievements
    pub async fn user_xp(&self, owner_id: &str) -> Result<XpSummary, PlanServiceError> {
        let xp = self
            .xp
            .total_xp(owner_id)
            .await
            .context("total_xp", owner_id)?;
        let achievements = self
            .xp
            .achievements(owner_id)
            .await
            .context("achievements", owner_id)?;
        Ok(XpSummary::new(xp, achievements))
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Delete a plan with its whole subtree and media
    ///
    /// The former parent is then recomputed from its remaining children.
    #[instrument(skip(self))]
    pub async fn delete_plan(
        &self,
        owner_id: &str,
        id: &str,
    ) -> Result<PlanDeletion, PlanServiceError> {
        let node = self.get_plan(owner_id, id).await?;
        let report = self.deletion.delete_subtree(owner_id, id).await?;

        let ancestors = match node.parent_id.as_deref() {
            Some(parent_id) => {
                self.aggregation
                    .recompute_from(owner_id, parent_id)
                    .await?
                    .updates
            }
            None => Vec::new(),
        };

        Ok(PlanDeletion { report, ancestors })
    }

    // ------------------------------------------------------------------
    // Media
    // ------------------------------------------------------------------

    /// Upload a file into the owner's folder for `plan_id`
    ///
    /// Without a plan the file lands in the owner's unattached folder.
    #[instrument(skip(self, bytes))]
    pub async fn upload_media(
        &self,
        owner_id: &str,
        plan_id: Option<&str>,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<UploadedBlob, PlanServiceError> {
        if let Some(plan_id) = plan_id {
            self.get_plan(owner_id, plan_id).await?;
        }

        let folder = plan_folder(&self.upload_folder, owner_id, plan_id);
        let uploaded = self
            .blobs
            .upload(UploadRequest {
                bytes,
                file_name: file_name.to_string(),
                folder,
            })
            .await
            .map_err(|e| {
                PlanServiceError::from_blob("upload", plan_id.unwrap_or(owner_id), e)
            })?;

        info!("Uploaded {} as {}", file_name, uploaded.public_id);
        Ok(uploaded)
    }

    /// Release a blob uploaded by `owner_id`
    ///
    /// Ids outside the owner's upload folder are rejected.
    pub async fn delete_media(
        &self,
        owner_id: &str,
        public_id: &str,
    ) -> Result<(), PlanServiceError> {
        let folder = format!("{}/", owner_folder(&self.upload_folder, owner_id));
        if !public_id.starts_with(&folder) {
            return Err(ValidationError::ForeignMedia(public_id.to_string()).into());
        }
        self.blobs
            .delete(public_id)
            .await
            .map_err(|e| PlanServiceError::from_blob("delete_media", public_id, e))
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn write(
        &self,
        owner_id: &str,
        id: &str,
        update: NodeUpdate,
    ) -> Result<PlanNode, PlanServiceError> {
        self.store
            .update_fields(owner_id, id, update)
            .await
            .context("update_fields", id)
    }

    /// Reject a manual progress write to a node whose progress is derived
    async fn ensure_leaf(&self, owner_id: &str, id: &str) -> Result<(), PlanServiceError> {
        let children = self
            .store
            .get_children(owner_id, Some(id))
            .await
            .context("get_children", id)?;
        if children.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::DerivedProgress(id.to_string()).into())
        }
    }

    /// Park every entry on a negative position, then write its target
    ///
    /// Parking keeps swaps clear of the unique sibling-position index. Stops at
    /// the first failure unless `keep_going`, and returns the first error.
    async fn write_positions(
        &self,
        owner_id: &str,
        entries: &[PositionUpdate],
        keep_going: bool,
    ) -> Result<(), PlanServiceError> {
        let parked = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.id.as_str(), -1 - i as i64));
        let targets = entries.iter().map(|entry| (entry.id.as_str(), entry.position));

        let mut first_error = None;
        for (id, position) in parked.chain(targets) {
            if let Err(err) = self.write(owner_id, id, NodeUpdate::position(position)).await {
                if !keep_going {
                    return Err(err);
                }
                warn!("Failed to move {} to position {}: {}", id, position, err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn grant(&self, grant: XpGrant) {
        let (owner_id, amount) = (grant.user_id.clone(), grant.xp_amount);
        match self.xp.record(grant).await {
            Ok(()) => debug!("Granted {} XP to {}", amount, owner_id),
            Err(e) => warn!("Failed to grant {} XP to {}: {}", amount, owner_id, e),
        }
    }

    async fn release_dropped(&self, before: &PlanNode, after: &PlanNode) {
        for media in dropped_media(&before.media_refs(), &after.media_refs()) {
            if let Err(e) = self.blobs.delete(&media.public_id).await {
                warn!(
                    "Failed to release media {} dropped from node {}: {}",
                    media.public_id, after.id, e
                );
            }
        }
    }
}

// Unit tests for private helpers in separate module
#[cfg(test)]
#[path = "plan_service_test.rs"]
mod plan_service_test;

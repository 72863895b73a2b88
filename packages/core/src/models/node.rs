//! Plan Node Data Structures
//!
//! This module defines the `PlanNode` struct and the payload types used to
//! create and partially update it.
//!
//! # Architecture
//!
//! - **Self-referential tree**: `parent_id` points at another node of the same
//!   owner; `None` marks a root plan. The collection is a forest.
//! - **Creation-only hierarchy**: `parent_id` and `level` are fixed when a node
//!   is inserted. `NodeUpdate` has no field for either, so no update can
//!   introduce a cycle.
//! - **Typed content**: `content` is a sequence of [`ContentItem`]s; only the
//!   storage backends serialize it.
//!
//! # Examples
//!
//! ```rust
//! use lifeplan_core::models::{NewPlan, PlanNode};
//!
//! let root = PlanNode::new_root("user-1", NewPlan::titled("Fitness"), 0);
//! assert_eq!(root.level, 1);
//! assert!(root.is_root());
//!
//! let child = PlanNode::new_child(&root, NewPlan::titled("Running"), 0);
//! assert_eq!(child.level, 2);
//! assert_eq!(child.parent_id.as_deref(), Some(root.id.as_str()));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::content::{ContentItem, MediaRef};

/// Highest value a `progress` field may hold.
pub const MAX_PROGRESS: u8 = 100;

/// Validation errors for plan payloads and content edits
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Progress must be between 0 and 100, got {0}")]
    ProgressOutOfRange(i64),

    #[error("Invalid parent reference: {0}")]
    InvalidParent(String),

    #[error("Content item not found: {0}")]
    UnknownContentItem(String),

    #[error("Checklist task index {index} out of range for content item {content_id}")]
    TaskIndexOutOfRange { content_id: String, index: usize },

    #[error("Content item {0} is not a checklist")]
    NotAChecklist(String),

    #[error("Progress of {0} is derived from its sub-plans")]
    DerivedProgress(String),

    #[error("Reorder lists {0} more than once")]
    DuplicateReorderEntry(String),

    #[error("Reorder assigns position {0} more than once")]
    DuplicatePosition(i64),

    #[error("Position must not be negative, got {0}")]
    NegativePosition(i64),

    #[error("Media {0} is not in the caller's folder")]
    ForeignMedia(String),
}

/// Check a raw progress value and narrow it to `u8`
pub fn validate_progress(value: i64) -> Result<u8, ValidationError> {
    if (0..=MAX_PROGRESS as i64).contains(&value) {
        Ok(value as u8)
    } else {
        Err(ValidationError::ProgressOutOfRange(value))
    }
}

/// A planning unit: a root plan or a nested sub-plan ("model").
///
/// # Fields
///
/// - `id`: UUID assigned at creation, never changes
/// - `owner_id`: tenant the node belongs to; every store call is scoped by it
/// - `parent_id`: parent node, `None` for roots
/// - `media_ref`: optional cover photo hosted by the blob store (`photo` on the wire)
/// - `content`: ordered content blocks, some of which reference hosted media
/// - `position`: order among siblings, unique within `(owner_id, parent_id)`
/// - `progress`: 0..=100, manual on leaves, the floor mean of children otherwise
/// - `level`: 1 for roots, `parent.level + 1` otherwise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanNode {
    pub id: String,

    pub owner_id: String,

    pub parent_id: Option<String>,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(rename = "photo", default)]
    pub media_ref: Option<MediaRef>,

    #[serde(default)]
    pub content: Vec<ContentItem>,

    pub position: i64,

    #[serde(default)]
    pub progress: u8,

    pub level: u32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl PlanNode {
    /// Build a root plan for `owner_id` at the given sibling position
    pub fn new_root(owner_id: impl Into<String>, plan: NewPlan, position: i64) -> Self {
        Self::build(owner_id.into(), None, 1, plan, position)
    }

    /// Build a direct child of `parent`, inheriting its owner and one level deeper
    pub fn new_child(parent: &PlanNode, plan: NewPlan, position: i64) -> Self {
        Self::build(
            parent.owner_id.clone(),
            Some(parent.id.clone()),
            parent.level + 1,
            plan,
            position,
        )
    }

    fn build(
        owner_id: String,
        parent_id: Option<String>,
        level: u32,
        plan: NewPlan,
        position: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            parent_id,
            title: plan.title.unwrap_or_else(|| {
                if level == 1 {
                    "New Plan".to_string()
                } else {
                    "New Model".to_string()
                }
            }),
            description: plan.description.unwrap_or_default(),
            media_ref: plan.photo,
            content: plan.content.unwrap_or_default(),
            position,
            progress: plan.progress.unwrap_or(0),
            level,
            created_at: now,
            updated_at: now,
        }
    }

    /// Roots have no parent and never take part in aggregation as a child
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Validate structural invariants that can be checked on a single row
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("id".to_string()));
        }
        if self.owner_id.is_empty() {
            return Err(ValidationError::MissingField("owner_id".to_string()));
        }
        if self.progress > MAX_PROGRESS {
            return Err(ValidationError::ProgressOutOfRange(self.progress as i64));
        }
        if self.parent_id.as_deref() == Some(self.id.as_str()) {
            return Err(ValidationError::InvalidParent(
                "Node cannot be its own parent".to_string(),
            ));
        }
        Ok(())
    }

    /// Every hosted blob this node owns: the cover plus all content media
    ///
    /// References without a public id (links to media hosted elsewhere) are
    /// skipped since there is nothing to release.
    pub fn media_refs(&self) -> Vec<MediaRef> {
        self.media_ref
            .iter()
            .cloned()
            .chain(self.content.iter().flat_map(ContentItem::media_refs))
            .filter(|media| !media.public_id.is_empty())
            .collect()
    }

    /// Apply a partial update in place
    ///
    /// Used by the in-memory store; remote backends send the same
    /// fields as a PATCH body instead.
    pub fn apply(&mut self, update: NodeUpdate) {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(description) = update.description {
            self.description = description.unwrap_or_default();
        }
        if let Some(media_ref) = update.media_ref {
            self.media_ref = media_ref;
        }
        if let Some(content) = update.content {
            self.content = content;
        }
        if let Some(position) = update.position {
            self.position = position;
        }
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        self.updated_at = Utc::now();
    }
}

/// Maps the three JSON shapes of a nullable field onto a double `Option`:
/// missing → `None`, `null` → `Some(None)`, value → `Some(Some(value))`.
fn deserialize_optional_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    // Missing field is handled by #[serde(default)] on the struct field
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

/// Partial node update for the tree store's `update_fields`
///
/// Only provided fields are written.
///
/// # Double-Option Pattern for Nullable Fields
///
/// `description` and `media_ref` distinguish three states:
///
/// - `None`: don't change this field
/// - `Some(None)`: set the field to NULL
/// - `Some(Some(value))`: set the field to the value
///
/// `parent_id` and `level` are not updatable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_optional_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,

    #[serde(
        rename = "photo",
        default,
        deserialize_with = "deserialize_optional_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub media_ref: Option<Option<MediaRef>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ContentItem>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl NodeUpdate {
    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn position(position: i64) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn content(content: Vec<ContentItem>) -> Self {
        Self {
            content: Some(content),
            ..Default::default()
        }
    }

    /// True when no field would be written
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.media_ref.is_none()
            && self.content.is_none()
            && self.position.is_none()
            && self.progress.is_none()
    }
}

/// Inbound payload for creating a plan or sub-plan
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlan {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub photo: Option<MediaRef>,
    #[serde(default)]
    pub content: Option<Vec<ContentItem>>,
    #[serde(default)]
    pub progress: Option<u8>,
}

impl NewPlan {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(progress) = self.progress {
            validate_progress(progress as i64)?;
        }
        if matches!(self.title.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err(ValidationError::MissingField("title".to_string()));
        }
        Ok(())
    }
}

/// Inbound partial payload for `PUT /api/plans/{id}`
///
/// Unlike [`NodeUpdate`] this carries no `position`: reordering has its own
/// operation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPatch {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "deserialize_optional_field")]
    pub description: Option<Option<String>>,

    #[serde(default, deserialize_with = "deserialize_optional_field")]
    pub photo: Option<Option<MediaRef>>,

    #[serde(default)]
    pub content: Option<Vec<ContentItem>>,

    #[serde(default)]
    pub progress: Option<i64>,
}

impl PlanPatch {
    /// Validate and convert into a store-level update
    pub fn into_update(self) -> Result<NodeUpdate, ValidationError> {
        let progress = self.progress.map(validate_progress).transpose()?;
        if matches!(self.title.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err(ValidationError::MissingField("title".to_string()));
        }
        Ok(NodeUpdate {
            title: self.title,
            description: self.description,
            media_ref: self.photo,
            content: self.content,
            position: None,
            progress,
        })
    }
}

/// One entry of a reorder request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: String,
    pub position: i64,
}

/// Outcome of a single-row delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    /// Whether a row existed and was removed
    pub existed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentBlock;
    use serde_json::json;

    #[test]
    fn test_root_and_child_levels() {
        let root = PlanNode::new_root("owner", NewPlan::default(), 0);
        assert_eq!(root.level, 1);
        assert_eq!(root.title, "New Plan");
        assert_eq!(root.progress, 0);

        let child = PlanNode::new_child(&root, NewPlan::default(), 3);
        assert_eq!(child.level, 2);
        assert_eq!(child.title, "New Model");
        assert_eq!(child.position, 3);
        assert_eq!(child.owner_id, "owner");
    }

    #[test]
    fn test_validate_rejects_self_parent() {
        let mut node = PlanNode::new_root("owner", NewPlan::titled("Loop"), 0);
        node.parent_id = Some(node.id.clone());
        assert!(matches!(
            node.validate(),
            Err(ValidationError::InvalidParent(_))
        ));
    }

    #[test]
    fn test_validate_progress_bounds() {
        assert_eq!(validate_progress(0).unwrap(), 0);
        assert_eq!(validate_progress(100).unwrap(), 100);
        assert!(validate_progress(101).is_err());
        assert!(validate_progress(-1).is_err());
    }

    #[test]
    fn test_node_update_double_option() {
        let update: NodeUpdate = serde_json::from_value(json!({
            "description": null,
            "title": "Renamed"
        }))
        .unwrap();
        assert_eq!(update.description, Some(None));
        assert_eq!(update.title.as_deref(), Some("Renamed"));
        assert_eq!(update.media_ref, None);

        let untouched: NodeUpdate = serde_json::from_value(json!({})).unwrap();
        assert!(untouched.is_empty());
    }

    #[test]
    fn test_apply_partial_update_leaves_other_fields() {
        let mut node = PlanNode::new_root("owner", NewPlan::titled("Keep"), 0);
        node.description = "Original".to_string();
        node.apply(NodeUpdate::progress(70));
        assert_eq!(node.progress, 70);
        assert_eq!(node.title, "Keep");
        assert_eq!(node.description, "Original");

        node.apply(NodeUpdate {
            description: Some(None),
            ..Default::default()
        });
        assert_eq!(node.description, "");
    }

    #[test]
    fn test_media_refs_collects_cover_and_gallery() {
        let mut node = PlanNode::new_root("owner", NewPlan::titled("Trip"), 0);
        node.media_ref = Some(MediaRef::new("plans/o/cover", "https://cdn/cover.jpg"));
        node.content.push(ContentItem::new(ContentBlock::Gallery {
            images: vec![
                crate::models::GalleryImage::hosted(MediaRef::new("plans/o/a", "https://cdn/a.jpg")),
                crate::models::GalleryImage::hosted(MediaRef::new("plans/o/b", "https://cdn/b.jpg")),
            ],
        }));
        node.content.push(ContentItem::new(ContentBlock::Text {
            text: "no media".to_string(),
        }));

        let ids: Vec<String> = node.media_refs().into_iter().map(|m| m.public_id).collect();
        assert_eq!(ids, vec!["plans/o/cover", "plans/o/a", "plans/o/b"]);
    }

    #[test]
    fn test_plan_patch_into_update() {
        let patch: PlanPatch = serde_json::from_value(json!({
            "progress": 55,
            "photo": null
        }))
        .unwrap();
        let update = patch.into_update().unwrap();
        assert_eq!(update.progress, Some(55));
        assert_eq!(update.media_ref, Some(None));
        assert!(update.title.is_none());

        let bad: PlanPatch = serde_json::from_value(json!({ "progress": 140 })).unwrap();
        assert!(matches!(
            bad.into_update(),
            Err(ValidationError::ProgressOutOfRange(140))
        ));
    }
}

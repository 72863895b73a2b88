//! Data Models
//!
//! This module contains the core data structures used throughout LifePlan:
//!
//! - `PlanNode` - A plan or nested sub-plan in the owner's forest
//! - `ContentItem` / `ContentBlock` - Typed content attached to a plan
//! - `NodeUpdate` / `PlanPatch` / `NewPlan` - Create and partial-update payloads
//! - `XpGrant` / `XpSummary` - Experience earned by completing checklist tasks

mod content;
mod node;
mod xp;

pub use content::{ChecklistTask, ContentBlock, ContentItem, GalleryImage, MediaRef};
pub use node::{
    validate_progress, DeleteResult, NewPlan, NodeUpdate, PlanNode, PlanPatch, PositionUpdate,
    ValidationError, MAX_PROGRESS,
};
pub use xp::{
    level_for, XpGrant, XpSummary, TASK_COMPLETED_ACTION, TASK_COMPLETED_XP, XP_PER_LEVEL,
};

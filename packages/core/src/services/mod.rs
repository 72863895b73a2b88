//! Business Services
//!
//! This module contains the core business logic:
//!
//! - `SubtreeDeletionEngine` - Deletes a node, its descendants and their media
//! - `ProgressAggregationEngine` - Recomputes ancestor progress after a change
//! - `PlanService` - Request-facing operations built on both engines
//!
//! Services only reach storage through the `TreeStore` and `BlobStore`
//! traits, and never cache node state between calls.

pub mod error;
pub mod plan_service;
pub mod progress_aggregation;
pub mod subtree_deletion;

pub use error::{ExternalError, PlanServiceError};
pub use plan_service::{PlanDeletion, PlanService, ProgressOutcome, DEFAULT_UPLOAD_FOLDER};
pub use progress_aggregation::{
    average_progress, AggregationReport, ProgressAggregationEngine, ProgressChange,
    MAX_DEPTH_MARGIN,
};
pub use subtree_deletion::{DeletionReport, SubtreeDeletionEngine};

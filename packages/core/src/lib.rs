//! LifePlan Core Business Logic Layer
//!
//! This crate provides the data model, storage adapters and services behind the
//! LifePlan planning backend. Plans form a per-owner forest: a root plan holds
//! nested sub-plans, each with content blocks, a cover photo and a progress
//! value that parents derive from their children.
//!
//! # Architecture
//!
//! - **Adapter-only storage**: every row access goes through [`db::TreeStore`];
//!   every media access through [`db::BlobStore`]
//! - **Explicit tenancy**: all store calls take the owner id
//! - **Synthesized cascade**: the store deletes single rows; subtrees are
//!   removed by [`services::SubtreeDeletionEngine`]
//! - **Derived progress**: [`services::ProgressAggregationEngine`] recomputes
//!   ancestors after a change
//!
//! # Modules
//!
//! - [`models`] - Data structures (PlanNode, ContentItem, NodeUpdate, etc.)
//! - [`db`] - Tree store and blob store traits with their backends
//! - [`services`] - Deletion and aggregation engines, `PlanService`

pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use models::*;
pub use services::*;

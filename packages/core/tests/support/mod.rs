//! Store wrappers shared by the integration tests
//!
//! Each wrapper delegates to an in-memory backend and adds one behavior:
//! injected failures, a write log, or a gate that holds a write until the
//! test releases it.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use lifeplan_core::db::{
    BlobError, BlobResult, BlobStore, InMemoryBlobStore, InMemoryTreeStore, StoreError,
    StoreResult, TreeStore, UploadRequest, UploadedBlob,
};
use lifeplan_core::models::{DeleteResult, NodeUpdate, PlanNode};
use tokio::sync::{oneshot, Mutex, Notify};

/// Tree store that fails chosen calls and logs every `update_fields`
#[derive(Default)]
pub struct FaultyTreeStore {
    pub inner: InMemoryTreeStore,
    fail_delete: Mutex<HashSet<String>>,
    fail_update: Mutex<HashSet<String>>,
    fail_update_countdown: Mutex<Option<usize>>,
    writes: Mutex<Vec<(String, NodeUpdate)>>,
}

impl FaultyTreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_delete_of(&self, id: &str) {
        self.fail_delete.lock().await.insert(id.to_string());
    }

    pub async fn fail_update_of(&self, id: &str) {
        self.fail_update.lock().await.insert(id.to_string());
    }

    /// Fail only the `update_fields` call after the next `skip` calls
    pub async fn fail_update_once_after(&self, skip: usize) {
        *self.fail_update_countdown.lock().await = Some(skip);
    }

    /// Ids passed to `update_fields`, in call order, clearing the log
    pub async fn take_writes(&self) -> Vec<String> {
        std::mem::take(&mut *self.writes.lock().await)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }
}

#[async_trait]
impl TreeStore for FaultyTreeStore {
    async fn get_node(&self, owner_id: &str, id: &str) -> StoreResult<Option<PlanNode>> {
        self.inner.get_node(owner_id, id).await
    }

    async fn get_children(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> StoreResult<Vec<PlanNode>> {
        self.inner.get_children(owner_id, parent_id).await
    }

    async fn insert_node(&self, node: PlanNode) -> StoreResult<PlanNode> {
        self.inner.insert_node(node).await
    }

    async fn update_fields(
        &self,
        owner_id: &str,
        id: &str,
        update: NodeUpdate,
    ) -> StoreResult<PlanNode> {
        if self.fail_update.lock().await.contains(id) {
            return Err(StoreError::backend(503, "update unavailable"));
        }
        {
            let mut countdown = self.fail_update_countdown.lock().await;
            match *countdown {
                Some(0) => {
                    *countdown = None;
                    return Err(StoreError::backend(503, "update unavailable"));
                }
                Some(n) => *countdown = Some(n - 1),
                None => {}
            }
        }
        self.writes
            .lock()
            .await
            .push((id.to_string(), update.clone()));
        self.inner.update_fields(owner_id, id, update).await
    }

    async fn delete_node(&self, owner_id: &str, id: &str) -> StoreResult<DeleteResult> {
        if self.fail_delete.lock().await.contains(id) {
            return Err(StoreError::backend(500, "delete failed"));
        }
        self.inner.delete_node(owner_id, id).await
    }

    async fn max_sibling_position(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> StoreResult<i64> {
        self.inner.max_sibling_position(owner_id, parent_id).await
    }
}

/// Tree store that holds the first `update_fields` of one id until released
pub struct GatedTreeStore {
    pub inner: Arc<InMemoryTreeStore>,
    gated_id: String,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    reached: Notify,
}

impl GatedTreeStore {
    pub fn new(
        inner: Arc<InMemoryTreeStore>,
        gated_id: impl Into<String>,
        gate: oneshot::Receiver<()>,
    ) -> Self {
        Self {
            inner,
            gated_id: gated_id.into(),
            gate: Mutex::new(Some(gate)),
            reached: Notify::new(),
        }
    }

    /// Resolves once a write is waiting at the gate
    pub async fn wait_until_held(&self) {
        self.reached.notified().await;
    }
}

#[async_trait]
impl TreeStore for GatedTreeStore {
    async fn get_node(&self, owner_id: &str, id: &str) -> StoreResult<Option<PlanNode>> {
        self.inner.get_node(owner_id, id).await
    }

    async fn get_children(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> StoreResult<Vec<PlanNode>> {
        self.inner.get_children(owner_id, parent_id).await
    }

    async fn insert_node(&self, node: PlanNode) -> StoreResult<PlanNode> {
        self.inner.insert_node(node).await
    }

    async fn update_fields(
        &self,
        owner_id: &str,
        id: &str,
        update: NodeUpdate,
    ) -> StoreResult<PlanNode> {
        if id == self.gated_id {
            let gate = self.gate.lock().await.take();
            if let Some(gate) = gate {
                self.reached.notify_one();
                let _ = gate.await;
            }
        }
        self.inner.update_fields(owner_id, id, update).await
    }

    async fn delete_node(&self, owner_id: &str, id: &str) -> StoreResult<DeleteResult> {
        self.inner.delete_node(owner_id, id).await
    }

    async fn max_sibling_position(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> StoreResult<i64> {
        self.inner.max_sibling_position(owner_id, parent_id).await
    }
}

/// Blob store whose deletes fail for chosen ids; every call is still recorded
#[derive(Default)]
pub struct FaultyBlobStore {
    pub inner: InMemoryBlobStore,
    fail: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<String>>,
}

impl FaultyBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_delete_of(&self, public_id: &str) {
        self.fail.lock().await.insert(public_id.to_string());
    }

    /// Every `delete` call, failed or not
    pub async fn attempts(&self) -> Vec<String> {
        self.attempts.lock().await.clone()
    }
}

#[async_trait]
impl BlobStore for FaultyBlobStore {
    async fn upload(&self, request: UploadRequest) -> BlobResult<UploadedBlob> {
        self.inner.upload(request).await
    }

    async fn delete(&self, public_id: &str) -> BlobResult<()> {
        self.attempts.lock().await.push(public_id.to_string());
        if self.fail.lock().await.contains(public_id) {
            return Err(BlobError::rejected(public_id, "error"));
        }
        self.inner.delete(public_id).await
    }
}

//! BlobStore Trait - Hosted Media Abstraction
//!
//! Media (cover photos, gallery images) lives on an external host and is
//! addressed by an opaque `public_id`. The core only needs two calls: upload
//! bytes into a folder, and delete by id.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::db::BlobError;
use crate::models::MediaRef;

pub type BlobResult<T> = Result<T, BlobError>;

/// Folder name used for uploads not yet attached to a plan
pub const UNATTACHED_FOLDER: &str = "temp";

/// Folder for media owned by `plan_id`
///
/// Grouping by owner and plan is for discoverability on the media host only;
/// deletion always goes through `public_id`.
pub fn plan_folder(root: &str, owner_id: &str, plan_id: Option<&str>) -> String {
    format!(
        "{}/{}",
        owner_folder(root, owner_id),
        plan_id.unwrap_or(UNATTACHED_FOLDER)
    )
}

/// Folder holding every upload of `owner_id`
pub fn owner_folder(root: &str, owner_id: &str) -> String {
    format!("{}/{}", root.trim_end_matches('/'), owner_id)
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub folder: String,
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedBlob {
    pub url: String,
    pub public_id: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub bytes: u64,
}

impl From<UploadedBlob> for MediaRef {
    fn from(blob: UploadedBlob) -> Self {
        MediaRef::new(blob.public_id, blob.url)
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> BlobResult<UploadedBlob>;

    /// Delete a blob by id. Deleting an id the host no longer knows succeeds.
    async fn delete(&self, public_id: &str) -> BlobResult<()>;
}

/// Blob store that keeps uploads in memory and records every delete call
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    deleted: Mutex<Vec<String>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `public_id` passed to `delete`, in call order
    pub async fn deleted(&self) -> Vec<String> {
        self.deleted.lock().await.clone()
    }

    pub async fn contains(&self, public_id: &str) -> bool {
        self.blobs.lock().await.contains_key(public_id)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn upload(&self, request: UploadRequest) -> BlobResult<UploadedBlob> {
        let stem = request
            .file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&request.file_name);
        let format = request
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let public_id = format!("{}/{}_{}", request.folder, stem, uuid::Uuid::new_v4().simple());
        let size = request.bytes.len() as u64;

        self.blobs.lock().await.insert(public_id.clone(), request.bytes);

        Ok(UploadedBlob {
            url: format!("memory://{}", public_id),
            public_id,
            format,
            bytes: size,
        })
    }

    async fn delete(&self, public_id: &str) -> BlobResult<()> {
        self.deleted.lock().await.push(public_id.to_string());
        self.blobs.lock().await.remove(public_id);
        Ok(())
    }
}

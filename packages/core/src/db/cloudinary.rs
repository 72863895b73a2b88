//! CloudinaryBlobStore - BlobStore over the Cloudinary upload API
//!
//! Uploads go to `/v1_1/{cloud}/auto/upload` as multipart forms; deletes go to
//! `/v1_1/{cloud}/image/destroy`. Both are signed: the signature is the hex
//! SHA-256 of the alphabetically sorted `key=value` parameters joined by `&`,
//! followed by the API secret.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::db::blob_store::{BlobResult, BlobStore, UploadRequest, UploadedBlob};
use crate::db::BlobError;

const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Override for tests; defaults to the public API host
    pub api_base: String,
}

impl CloudinaryConfig {
    pub fn new(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
    #[serde(default)]
    format: String,
    #[serde(default)]
    bytes: u64,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

/// Sign request parameters
///
/// `params` must not contain `file`, `api_key`, `resource_type` or the
/// signature fields; those are excluded from signing by the API.
pub fn sign(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn unix_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string()
}

pub struct CloudinaryBlobStore {
    client: Client,
    config: CloudinaryConfig,
}

impl CloudinaryBlobStore {
    pub fn new(config: CloudinaryConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn endpoint(&self, resource: &str, action: &str) -> String {
        format!(
            "{}/v1_1/{}/{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name,
            resource,
            action
        )
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> BlobResult<T> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BlobError::backend(status.as_u16(), body));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl BlobStore for CloudinaryBlobStore {
    async fn upload(&self, request: UploadRequest) -> BlobResult<UploadedBlob> {
        let timestamp = unix_timestamp();
        let signed = [
            ("folder", request.folder.clone()),
            ("timestamp", timestamp.clone()),
        ];
        let signature = sign(&signed, &self.config.api_secret);

        let file = Part::bytes(request.bytes).file_name(request.file_name.clone());
        let form = Form::new()
            .part("file", file)
            .text("folder", request.folder.clone())
            .text("timestamp", timestamp)
            .text("api_key", self.config.api_key.clone())
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        debug!("Uploading {} into {}", request.file_name, request.folder);
        let response = self
            .client
            .post(self.endpoint("auto", "upload"))
            .multipart(form)
            .send()
            .await?;

        let uploaded: UploadResponse = Self::parse(response).await?;
        Ok(UploadedBlob {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
            format: uploaded.format,
            bytes: uploaded.bytes,
        })
    }

    async fn delete(&self, public_id: &str) -> BlobResult<()> {
        let timestamp = unix_timestamp();
        let signed = [
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp.clone()),
        ];
        let signature = sign(&signed, &self.config.api_secret);

        let response = self
            .client
            .post(self.endpoint("image", "destroy"))
            .form(&[
                ("public_id", public_id.to_string()),
                ("timestamp", timestamp),
                ("api_key", self.config.api_key.clone()),
                ("signature_algorithm", "sha256".to_string()),
                ("signature", signature),
            ])
            .send()
            .await?;

        let destroyed: DestroyResponse = Self::parse(response).await?;
        match destroyed.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(BlobError::rejected(public_id, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_sorts_and_skips_empty_params() {
        let a = sign(
            &[
                ("timestamp", "1700000000".to_string()),
                ("folder", "plans/u".to_string()),
                ("tags", String::new()),
            ],
            "secret",
        );
        let b = sign(
            &[
                ("folder", "plans/u".to_string()),
                ("timestamp", "1700000000".to_string()),
            ],
            "secret",
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut hasher = Sha256::new();
        hasher.update(b"folder=plans/u&timestamp=1700000000secret");
        assert_eq!(a, hex::encode(hasher.finalize()));
    }

    #[test]
    fn test_endpoint_layout() {
        let mut config = CloudinaryConfig::new("demo", "key", "secret");
        config.api_base = "http://localhost:9000/".to_string();
        let store = CloudinaryBlobStore::new(config);
        assert_eq!(
            store.endpoint("image", "destroy"),
            "http://localhost:9000/v1_1/demo/image/destroy"
        );
    }
}

//! Media Endpoints
//!
//! # Endpoints
//!
//! - `POST /api/upload` - Upload one file (multipart field `file`)
//! - `POST /api/upload/multiple` - Upload several files (fields `files[]`)
//! - `POST /api/delete` - Release a hosted file by public id (caller's own only)
//!
//! Uploads accept an optional `plan_id` text field; files are then grouped in
//! that plan's folder on the media host.

use axum::{
    extract::{Multipart, State},
    response::Json,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};

use lifeplan_core::db::UploadedBlob;

use super::{ok, ApiResult, AppState, Owner};
use crate::http_error::HttpError;

const PLAN_FIELD: &str = "plan_id";

/// Uploaded file as returned to the client
#[derive(Debug, Serialize)]
pub struct UploadedFile {
    #[serde(flatten)]
    pub blob: UploadedBlob,
    /// Original file name
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMediaBody {
    #[serde(alias = "publicId")]
    pub public_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMedia {
    pub public_id: String,
}

struct FilePart {
    file_name: String,
    bytes: Vec<u8>,
}

/// Read the optional plan id and every non-empty file under one of `file_fields`
async fn read_form(
    mut multipart: Multipart,
    file_fields: &[&str],
) -> Result<(Option<String>, Vec<FilePart>), HttpError> {
    let mut plan_id = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == PLAN_FIELD {
            let value = field.text().await?;
            plan_id = Some(value.trim().to_string()).filter(|v| !v.is_empty());
        } else if file_fields.contains(&name.as_str()) {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await?;
            // Browsers send an empty part when no file was picked
            if file_name.is_empty() || bytes.is_empty() {
                continue;
            }
            files.push(FilePart {
                file_name,
                bytes: bytes.to_vec(),
            });
        }
    }

    Ok((plan_id, files))
}

async fn upload_one(
    state: &AppState,
    owner: &str,
    plan_id: Option<&str>,
    file: FilePart,
) -> Result<UploadedFile, HttpError> {
    let blob = state
        .service
        .upload_media(owner, plan_id, file.bytes, &file.file_name)
        .await?;
    Ok(UploadedFile {
        blob,
        name: file.file_name,
    })
}

async fn upload(
    State(state): State<AppState>,
    Owner(owner): Owner,
    multipart: Multipart,
) -> ApiResult<UploadedFile> {
    let (plan_id, files) = read_form(multipart, &["file"]).await?;
    let file = files
        .into_iter()
        .next()
        .ok_or_else(|| HttpError::invalid_input("No file provided"))?;

    Ok(ok(upload_one(&state, &owner, plan_id.as_deref(), file).await?))
}

async fn upload_multiple(
    State(state): State<AppState>,
    Owner(owner): Owner,
    multipart: Multipart,
) -> ApiResult<Vec<UploadedFile>> {
    let (plan_id, files) = read_form(multipart, &["files[]", "files"]).await?;
    if files.is_empty() {
        return Err(HttpError::invalid_input("No files provided"));
    }

    let mut uploaded = Vec::with_capacity(files.len());
    for file in files {
        uploaded.push(upload_one(&state, &owner, plan_id.as_deref(), file).await?);
    }
    Ok(ok(uploaded))
}

async fn delete_media(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Json(body): Json<DeleteMediaBody>,
) -> ApiResult<DeletedMedia> {
    if body.public_id.trim().is_empty() {
        return Err(HttpError::invalid_input("No public_id provided"));
    }
    state.service.delete_media(&owner, &body.public_id).await?;
    Ok(ok(DeletedMedia {
        public_id: body.public_id,
    }))
}

/// Create media endpoint routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/upload", post(upload))
        .route("/api/upload/multiple", post(upload_multiple))
        .route("/api/delete", post(delete_media))
        .with_state(state)
}

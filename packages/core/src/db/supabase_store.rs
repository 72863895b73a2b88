//! SupabaseTreeStore - TreeStore over a PostgREST endpoint
//!
//! Rows live in a single `plans` table (DDL in `sql/plans.sql`); the XP
//! ledger lives in `user_xp` and `achievements` next to it. Every call is
//! one HTTP request filtered by `user_id`, so tenant isolation holds even if a
//! caller passes another owner's node id.
//!
//! `content` and `photo` are JSON columns. Older rows stored `content` as a
//! JSON-encoded string and `photo` as a bare URL; both shapes are accepted on
//! read and normalized on the next write. This is the only place in the crate
//! that (de)serializes those columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::db::tree_store::{StoreResult, TreeStore};
use crate::db::xp_store::XpStore;
use crate::db::StoreError;
use crate::models::{
    ContentItem, DeleteResult, MediaRef, NodeUpdate, PlanNode, XpGrant, MAX_PROGRESS,
};

/// Connection settings for the PostgREST endpoint
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// Service or anon key sent as both `apikey` and bearer token
    pub api_key: String,
    pub table: String,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            table: "plans".to_string(),
        }
    }
}

/// Row shape of the `plans` table
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlanRow {
    id: String,
    user_id: String,
    parent_id: Option<String>,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    photo: Option<Value>,
    #[serde(default)]
    content: Option<Value>,
    position: i64,
    #[serde(default)]
    progress: i64,
    level: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct PositionRow {
    position: i64,
}

fn decode_photo(value: Option<Value>) -> StoreResult<Option<MediaRef>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(url)) if url.is_empty() => Ok(None),
        Some(Value::String(url)) => Ok(Some(
            MediaRef::from_hosted_url(&url).unwrap_or_else(|| MediaRef::new("", url)),
        )),
        Some(other) => Ok(Some(serde_json::from_value(other)?)),
    }
}

fn decode_content(value: Option<Value>) -> StoreResult<Vec<ContentItem>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(encoded)) if encoded.trim().is_empty() => Ok(Vec::new()),
        Some(Value::String(encoded)) => Ok(serde_json::from_str(&encoded)?),
        Some(other) => Ok(serde_json::from_value(other)?),
    }
}

impl TryFrom<PlanRow> for PlanNode {
    type Error = StoreError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        Ok(PlanNode {
            media_ref: decode_photo(row.photo)?,
            content: decode_content(row.content)?,
            id: row.id,
            owner_id: row.user_id,
            parent_id: row.parent_id,
            title: row.title,
            description: row.description.unwrap_or_default(),
            position: row.position,
            progress: row.progress.clamp(0, MAX_PROGRESS as i64) as u8,
            level: row.level.max(1) as u32,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<&PlanNode> for PlanRow {
    type Error = StoreError;

    fn try_from(node: &PlanNode) -> Result<Self, Self::Error> {
        Ok(PlanRow {
            id: node.id.clone(),
            user_id: node.owner_id.clone(),
            parent_id: node.parent_id.clone(),
            title: node.title.clone(),
            description: Some(node.description.clone()),
            photo: node.media_ref.as_ref().map(serde_json::to_value).transpose()?,
            content: Some(serde_json::to_value(&node.content)?),
            position: node.position,
            progress: node.progress as i64,
            level: node.level as i64,
            created_at: node.created_at,
            updated_at: node.updated_at,
        })
    }
}

/// PATCH body holding only the columns present in `update`
fn patch_body(update: &NodeUpdate) -> StoreResult<Value> {
    let mut body = Map::new();
    if let Some(title) = &update.title {
        body.insert("title".to_string(), json!(title));
    }
    if let Some(description) = &update.description {
        // Column is non-null; clearing stores the empty string
        body.insert(
            "description".to_string(),
            json!(description.as_deref().unwrap_or_default()),
        );
    }
    if let Some(media_ref) = &update.media_ref {
        body.insert("photo".to_string(), serde_json::to_value(media_ref)?);
    }
    if let Some(content) = &update.content {
        body.insert("content".to_string(), serde_json::to_value(content)?);
    }
    if let Some(position) = update.position {
        body.insert("position".to_string(), json!(position));
    }
    if let Some(progress) = update.progress {
        body.insert("progress".to_string(), json!(progress));
    }
    body.insert("updated_at".to_string(), json!(Utc::now()));
    Ok(Value::Object(body))
}

fn parent_filter(parent_id: Option<&str>) -> String {
    match parent_id {
        Some(id) => format!("eq.{}", id),
        None => "is.null".to_string(),
    }
}

fn rest_url(config: &SupabaseConfig, table: &str) -> String {
    format!("{}/rest/v1/{}", config.url.trim_end_matches('/'), table)
}

fn with_api_key(request: RequestBuilder, api_key: &str) -> RequestBuilder {
    request
        .header("apikey", api_key)
        .header("Authorization", format!("Bearer {}", api_key))
}

/// Map 409 to `Conflict` and any other non-success status to `Backend`
async fn check_status(response: Response) -> StoreResult<Response> {
    let status = response.status();
    if status == StatusCode::CONFLICT {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::conflict(body));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::backend(status.as_u16(), body));
    }
    Ok(response)
}

async fn read_rows<T: DeserializeOwned>(response: Response) -> StoreResult<Vec<T>> {
    Ok(check_status(response).await?.json::<Vec<T>>().await?)
}

/// TreeStore backed by a Supabase (PostgREST) table
#[derive(Clone)]
pub struct SupabaseTreeStore {
    client: Client,
    config: SupabaseConfig,
}

impl SupabaseTreeStore {
    pub fn new(config: SupabaseConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: SupabaseConfig) -> Self {
        Self { client, config }
    }

    fn table_url(&self) -> String {
        rest_url(&self.config, &self.config.table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        with_api_key(request, &self.config.api_key)
    }

    fn into_nodes(rows: Vec<PlanRow>) -> StoreResult<Vec<PlanNode>> {
        rows.into_iter().map(PlanNode::try_from).collect()
    }
}

#[async_trait]
impl TreeStore for SupabaseTreeStore {
    async fn get_node(&self, owner_id: &str, id: &str) -> StoreResult<Option<PlanNode>> {
        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(&[
                ("select", "*".to_string()),
                ("id", format!("eq.{}", id)),
                ("user_id", format!("eq.{}", owner_id)),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<PlanRow> = read_rows(response).await?;
        rows.into_iter().next().map(PlanNode::try_from).transpose()
    }

    async fn get_children(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> StoreResult<Vec<PlanNode>> {
        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{}", owner_id)),
                ("parent_id", parent_filter(parent_id)),
                ("order", "position.asc".to_string()),
            ])
            .send()
            .await?;

        let nodes = Self::into_nodes(read_rows(response).await?)?;
        debug!(
            "Fetched {} children of {}",
            nodes.len(),
            parent_id.unwrap_or("<root>")
        );
        Ok(nodes)
    }

    async fn insert_node(&self, node: PlanNode) -> StoreResult<PlanNode> {
        let row = PlanRow::try_from(&node)?;
        let response = self
            .authorized(self.client.post(self.table_url()))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;

        let rows: Vec<PlanRow> = read_rows(response).await?;
        match rows.into_iter().next() {
            Some(row) => PlanNode::try_from(row),
            // Without a representation the insert still happened
            None => Ok(node),
        }
    }

    async fn update_fields(
        &self,
        owner_id: &str,
        id: &str,
        update: NodeUpdate,
    ) -> StoreResult<PlanNode> {
        let response = self
            .authorized(self.client.patch(self.table_url()))
            .header("Prefer", "return=representation")
            .query(&[
                ("id", format!("eq.{}", id)),
                ("user_id", format!("eq.{}", owner_id)),
            ])
            .json(&patch_body(&update)?)
            .send()
            .await?;

        let rows: Vec<PlanRow> = read_rows(response).await?;
        rows.into_iter()
            .next()
            .map(PlanNode::try_from)
            .unwrap_or_else(|| Err(StoreError::not_found(id)))
    }

    async fn delete_node(&self, owner_id: &str, id: &str) -> StoreResult<DeleteResult> {
        let response = self
            .authorized(self.client.delete(self.table_url()))
            .header("Prefer", "return=representation")
            .query(&[
                ("id", format!("eq.{}", id)),
                ("user_id", format!("eq.{}", owner_id)),
            ])
            .send()
            .await?;

        let rows: Vec<Value> = read_rows(response).await?;
        Ok(DeleteResult {
            existed: !rows.is_empty(),
        })
    }

    async fn max_sibling_position(
        &self,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> StoreResult<i64> {
        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(&[
                ("select", "position".to_string()),
                ("user_id", format!("eq.{}", owner_id)),
                ("parent_id", parent_filter(parent_id)),
                ("order", "position.desc".to_string()),
                ("limit", "1".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<PositionRow> = read_rows(response).await?;
        Ok(rows.first().map(|r| r.position).unwrap_or(-1))
    }
}

/// Ledger table for XP grants
pub const XP_TABLE: &str = "user_xp";

/// Achievement rows, read-only from this crate
pub const ACHIEVEMENTS_TABLE: &str = "achievements";

#[derive(Debug, Deserialize)]
struct XpAmountRow {
    #[serde(default)]
    xp_amount: i64,
}

/// XpStore backed by the `user_xp` and `achievements` tables
#[derive(Clone)]
pub struct SupabaseXpStore {
    client: Client,
    config: SupabaseConfig,
}

impl SupabaseXpStore {
    pub fn new(config: SupabaseConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: SupabaseConfig) -> Self {
        Self { client, config }
    }

    fn get(&self, table: &str, owner_id: &str, select: &str) -> RequestBuilder {
        with_api_key(
            self.client.get(rest_url(&self.config, table)),
            &self.config.api_key,
        )
        .query(&[
            ("select", select.to_string()),
            ("user_id", format!("eq.{}", owner_id)),
        ])
    }
}

#[async_trait]
impl XpStore for SupabaseXpStore {
    async fn record(&self, grant: XpGrant) -> StoreResult<()> {
        let response = with_api_key(
            self.client.post(rest_url(&self.config, XP_TABLE)),
            &self.config.api_key,
        )
        .header("Prefer", "return=minimal")
        .json(&grant)
        .send()
        .await?;

        check_status(response).await?;
        debug!("Recorded {} XP for {}", grant.xp_amount, grant.user_id);
        Ok(())
    }

    async fn total_xp(&self, owner_id: &str) -> StoreResult<i64> {
        let response = self.get(XP_TABLE, owner_id, "xp_amount").send().await?;
        let rows: Vec<XpAmountRow> = read_rows(response).await?;
        Ok(rows.iter().map(|r| r.xp_amount).sum())
    }

    async fn achievements(&self, owner_id: &str) -> StoreResult<Vec<Value>> {
        let response = self.get(ACHIEVEMENTS_TABLE, owner_id, "*").send().await?;
        read_rows(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_legacy_string_content() {
        let encoded = Value::String(
            r#"[{"id":"c1","type":"text","data":{"text":"hello"}}]"#.to_string(),
        );
        let content = decode_content(Some(encoded)).unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0].id, "c1");

        assert!(decode_content(Some(Value::String(String::new())))
            .unwrap()
            .is_empty());
        assert!(decode_content(None).unwrap().is_empty());
    }

    #[test]
    fn test_decode_legacy_photo_url() {
        let hosted = decode_photo(Some(json!(
            "https://res.cloudinary.com/d/image/upload/v1/plans/u/cover.jpg"
        )))
        .unwrap()
        .unwrap();
        assert_eq!(hosted.public_id, "plans/u/cover");

        let foreign = decode_photo(Some(json!("https://example.com/a.jpg")))
            .unwrap()
            .unwrap();
        assert!(foreign.public_id.is_empty());

        let structured = decode_photo(Some(json!({ "publicId": "p", "url": "u" })))
            .unwrap()
            .unwrap();
        assert_eq!(structured, MediaRef::new("p", "u"));
    }

    #[test]
    fn test_patch_body_keeps_explicit_nulls() {
        let body = patch_body(&NodeUpdate {
            media_ref: Some(None),
            progress: Some(30),
            ..Default::default()
        })
        .unwrap();

        let object = body.as_object().unwrap();
        assert!(object["photo"].is_null());
        assert_eq!(object["progress"], 30);
        assert!(!object.contains_key("title"));
        assert!(!object.contains_key("description"));
        assert!(object.contains_key("updated_at"));
    }

    #[test]
    fn test_parent_filter() {
        assert_eq!(parent_filter(None), "is.null");
        assert_eq!(parent_filter(Some("abc")), "eq.abc");
    }
}

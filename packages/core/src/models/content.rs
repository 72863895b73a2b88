//! Plan Content Blocks
//!
//! Content is an ordered list of typed blocks attached to a plan. Blocks are
//! stored as one JSON column by the remote backend; inside the crate they are
//! always the typed [`ContentBlock`] variants below.
//!
//! Wire shape (the `type` tags match what the web client sends):
//!
//! ```json
//! { "id": "…", "createdAt": "…", "type": "photo", "data": { "images": [ … ] } }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to a blob hosted by the media service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    /// Identifier used to delete the blob
    pub public_id: String,
    /// Delivery URL shown to clients
    pub url: String,
}

impl MediaRef {
    pub fn new(public_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            public_id: public_id.into(),
            url: url.into(),
        }
    }

    /// Recover a media reference from a hosted delivery URL
    ///
    /// Delivery URLs look like
    /// `https://res.cloudinary.com/<cloud>/image/upload/v1712/<folder>/<name>.jpg`;
    /// the public id is every segment after the version with the extension
    /// stripped from the last one. Transformation segments between `upload`
    /// and the version are skipped.
    ///
    /// ```rust
    /// use lifeplan_core::models::MediaRef;
    ///
    /// let url = "https://res.cloudinary.com/demo/image/upload/v1712/plans/u1/p1/cover.jpg";
    /// let media = MediaRef::from_hosted_url(url).unwrap();
    /// assert_eq!(media.public_id, "plans/u1/p1/cover");
    /// ```
    pub fn from_hosted_url(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next()?;
        let mut segments = path.split('/').skip_while(|s| *s != "upload");
        segments.next()?;

        let rest: Vec<&str> = segments.collect();
        let version_at = rest.iter().position(|s| is_version_segment(s))?;
        let id_segments = &rest[version_at + 1..];
        let (last, folders) = id_segments.split_last()?;

        let stem = match last.rsplit_once('.') {
            Some((stem, _ext)) if !stem.is_empty() => stem,
            _ => last,
        };
        if stem.is_empty() {
            return None;
        }

        let mut public_id = folders.join("/");
        if !public_id.is_empty() {
            public_id.push('/');
        }
        public_id.push_str(stem);

        Some(Self::new(public_id, url))
    }
}

fn is_version_segment(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].chars().all(|c| c.is_ascii_digit())
}

/// One picture inside a photo-gallery block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl GalleryImage {
    pub fn hosted(media: MediaRef) -> Self {
        Self {
            url: media.url,
            public_id: Some(media.public_id),
            name: None,
        }
    }

    /// Media reference for this image, if it lives on the media host
    pub fn media_ref(&self) -> Option<MediaRef> {
        match &self.public_id {
            Some(public_id) => Some(MediaRef::new(public_id.clone(), self.url.clone())),
            None => MediaRef::from_hosted_url(&self.url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistTask {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// Typed content block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(rename = "photo")]
    Gallery {
        #[serde(default)]
        images: Vec<GalleryImage>,
    },
    #[serde(rename = "checkbox")]
    Checklist {
        #[serde(default)]
        tasks: Vec<ChecklistTask>,
    },
    /// Link to a nested plan ("model")
    #[serde(rename = "model")]
    PlanRef {
        #[serde(rename = "planId")]
        plan_id: String,
        #[serde(default)]
        title: String,
    },
}

fn new_content_id() -> String {
    Uuid::new_v4().to_string()
}

/// A content block plus its identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    #[serde(default = "new_content_id")]
    pub id: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(flatten)]
    pub block: ContentBlock,
}

impl ContentItem {
    pub fn new(block: ContentBlock) -> Self {
        Self {
            id: new_content_id(),
            created_at: Utc::now(),
            block,
        }
    }

    /// Every hosted blob referenced by this block
    pub fn media_refs(&self) -> Vec<MediaRef> {
        match &self.block {
            ContentBlock::Gallery { images } => {
                images.iter().filter_map(GalleryImage::media_ref).collect()
            }
            ContentBlock::Text { .. }
            | ContentBlock::Checklist { .. }
            | ContentBlock::PlanRef { .. } => Vec::new(),
        }
    }
}

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;

/// Asset publication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Draft,
    Published,
    Archived,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Draft => "draft",
            AssetStatus::Published => "published",
            AssetStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(AssetStatus::Draft),
            "published" => Some(AssetStatus::Published),
            "archived" => Some(AssetStatus::Archived),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            AssetStatus::Draft => 0,
            AssetStatus::Published => 1,
            AssetStatus::Archived => 2,
        }
    }

    /// Status moves forward only (draft -> published -> archived) unless the
    /// actor holds the manage capability, which may set any state.
    pub fn can_transition(&self, to: AssetStatus, manage: bool) -> bool {
        if manage {
            return true;
        }
        to.rank() == self.rank() + 1
    }
}

/// Asset catalog row
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AssetRecord {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub storage_path: Option<String>,
    pub public_url: String,
    pub thumbnail_url: Option<String>,
    pub category: String,
    /// JSON array of strings
    pub tags: String,
    pub status: String,
    pub display_order: i64,
    pub event_id: Option<String>,
    pub partner_id: Option<String>,
    pub size_bytes: i64,
    pub mime_type: Option<String>,
    /// JSON object
    pub metadata: String,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl AssetRecord {
    pub fn get_status(&self) -> AssetStatus {
        AssetStatus::from_str(&self.status).unwrap_or(AssetStatus::Draft)
    }
}

/// Asset response with parsed JSON fields
#[derive(Debug, Clone, Serialize)]
pub struct AssetResponse {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub storage_path: Option<String>,
    pub public_url: String,
    pub thumbnail_url: Option<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub status: String,
    pub display_order: i64,
    pub event_id: Option<String>,
    pub partner_id: Option<String>,
    pub size_bytes: i64,
    pub mime_type: Option<String>,
    pub metadata: serde_json::Value,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<AssetRecord> for AssetResponse {
    fn from(asset: AssetRecord) -> Self {
        let tags = serde_json::from_str(&asset.tags).unwrap_or_default();
        let metadata =
            serde_json::from_str(&asset.metadata).unwrap_or(serde_json::Value::Null);
        Self {
            id: asset.id,
            title: asset.title,
            description: asset.description,
            storage_path: asset.storage_path,
            public_url: asset.public_url,
            thumbnail_url: asset.thumbnail_url,
            category: asset.category,
            tags,
            status: asset.status,
            display_order: asset.display_order,
            event_id: asset.event_id,
            partner_id: asset.partner_id,
            size_bytes: asset.size_bytes,
            mime_type: asset.mime_type,
            metadata,
            created_by: asset.created_by,
            created_at: asset.created_at,
            updated_at: asset.updated_at,
        }
    }
}

/// Gallery listing query parameters
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
}

/// Paginated listing response
#[derive(Debug, Serialize)]
pub struct PagedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

/// Update request; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateAssetRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub display_order: Option<i64>,
    pub status: Option<String>,
    pub event_id: Option<String>,
    pub partner_id: Option<String>,
}

/// Gallery statistics
#[derive(Debug, Serialize)]
pub struct GalleryStats {
    pub total_files: i64,
    pub total_size: i64,
    pub by_category: HashMap<String, i64>,
    pub by_status: HashMap<String, i64>,
    pub recent_uploads: Vec<AssetResponse>,
}

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Entry in the Object Store
#[derive(Debug, Clone, Serialize)]
pub struct ObjectEntry {
    pub path: String,
    pub size_bytes: u64,
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Listing options for the Object Store
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    pub limit: Option<usize>,
    pub offset: usize,
}

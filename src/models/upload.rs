use bytes::Bytes;
use serde::Serialize;

use crate::models::AssetResponse;

/// Incoming file payload for the upload pipeline
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub mime: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Outcome of a best-effort pipeline step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    Skipped(String),
    Failed(String),
}

impl StepOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, StepOutcome::Applied)
    }
}

/// Per-step outcomes carried in the upload response so callers can see
/// partial degradation instead of digging through logs.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSteps {
    pub optimize: StepOutcome,
    pub watermark: StepOutcome,
    pub thumbnail: StepOutcome,
    pub audit: StepOutcome,
}

/// Result of a successful pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct Uploaded {
    pub path: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub metadata: serde_json::Value,
    pub steps: PipelineSteps,
}

/// Per-item result of a batch upload, in input order
#[derive(Debug, Serialize)]
pub struct BatchItemResult {
    pub file_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate batch summary
#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BatchItemResult>,
}
